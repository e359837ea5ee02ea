mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chain_fs::{ChainFileSystem, Geometry, Inum, Mode};
use chain_fs_fuse::{BlockFile, dangling_entries, put, remove, to_io_error};
use clap::Parser;
use cli::{Cli, Command, ImageArgs};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Pack { source, image } => pack(&source, &image),
        Command::Ls { image, path } => {
            let fs = open(&image)?;
            for dirent in fs.list(path.as_str()).map_err(to_io_error)? {
                println!("{:>4} {}", dirent.inum.raw(), dirent.name);
            }
            Ok(())
        }
        Command::Cat { image, path } => {
            let fs = open(&image)?;
            let size = fs.stat(path.as_str()).map_err(to_io_error)?.size;
            let mut buf = vec![0; size as usize];
            let len = fs.read(path.as_str(), 0, &mut buf).map_err(to_io_error)?;
            io::stdout().write_all(&buf[..len])
        }
        Command::Stat { image, path } => {
            let fs = open(&image)?;
            let stat = fs.stat(path.as_str()).map_err(to_io_error)?;
            println!("inum:   {}", stat.inum.raw());
            println!("mode:   {:o}", stat.mode.raw());
            println!("links:  {}", stat.links);
            println!("size:   {}", stat.size);
            println!("blocks: {}", stat.blocks);
            println!("atime:  {}", stat.atime);
            println!("mtime:  {}", stat.mtime);
            Ok(())
        }
        Command::Put { image, host, dest } => {
            let data = fs::read(&host)?;
            let mut fs = open(&image)?.with_clock(now);
            let inum = put(&mut fs, &dest, &data)?;
            log::info!("{host:?} -> {dest:?} ({inum:?})");
            Ok(())
        }
        Command::Rm { image, path } => remove(&mut open(&image)?, &path),
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn pack(source: &Path, args: &ImageArgs) -> io::Result<()> {
    println!("source={source:?}\nimage={:?}", args.image);

    let geometry = Geometry::new(args.blocks, args.inodes);
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args.image)?;
    fd.set_len(geometry.image_bytes())?;

    let mut fs = ChainFileSystem::format(Arc::new(BlockFile::new(fd)), geometry)
        .map_err(to_io_error)?
        .with_clock(now);
    copy_dir(&mut fs, source, chain_fs::ROOT_INUM)?;

    log::info!(
        "packed, {} inodes and {} blocks left",
        fs.free_inodes(),
        fs.free_blocks()
    );
    Ok(())
}

/// 递归地把宿主目录 `host` 拷贝到镜像中的目录 `dir` 下
fn copy_dir(fs: &mut ChainFileSystem, host: &Path, dir: Inum) -> io::Result<()> {
    for entry in fs::read_dir(host)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("skip non UTF-8 name {name:?}");
            continue;
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let sub = fs
                .mkdir(dir, name, Mode::DIRECTORY.permissions())
                .map_err(to_io_error)?;
            copy_dir(fs, &entry.path(), sub)?;
        } else if file_type.is_file() {
            log::info!("file={:?}", entry.path());
            let data = fs::read(entry.path())?;
            let inum = fs.mknod(dir, name, Mode::REGULAR).map_err(to_io_error)?;
            fs.write(inum, 0, &data).map_err(to_io_error)?;
        }
    }
    Ok(())
}

/// 镜像不记录几何参数，挂载时由文件大小与 `--inodes` 推出
fn open(args: &ImageArgs) -> io::Result<ChainFileSystem> {
    let fd = OpenOptions::new().read(true).write(true).open(&args.image)?;
    let geometry = Geometry::with_image_bytes(fd.metadata()?.len(), args.inodes);
    let fs =
        ChainFileSystem::mount(Arc::new(BlockFile::new(fd)), geometry).map_err(to_io_error)?;

    let dangling = dangling_entries(&fs, "/")?;
    if !dangling.is_empty() {
        log::warn!(
            "{} root entries point past {} inodes, was the image packed with another --inodes?",
            dangling.len(),
            args.inodes
        );
    }
    Ok(fs)
}
