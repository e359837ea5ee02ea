use alloc::vec::Vec;

/// 以 `/` 分隔的路径。
///
/// 路径只在调用期间被解析，从不写入镜像；`.` 与 `..` 作为普通的目录项名查找。
pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 按 `/` 切分后的非空分量。
    ///
    /// `"/a//b/"` 得到 `["a", "b"]`，`"/"` 与 `""` 得到空序列。
    fn components(&self) -> Vec<&Self>;

    /// 返回路径的`(父目录, 文件名)`
    ///
    /// 结尾的 `/` 被忽略；父目录为空时用 `/` 代替，
    /// 不含 `/` 的相对路径得到 `("", path)`。
    /// 路径为根目录或空串时返回 [`None`]。
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }
}

impl Path for str {
    #[inline]
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn components(&self) -> Vec<&Self> {
        self.split('/').filter(|cmp| !cmp.is_empty()).collect()
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let path = self.trim_end_matches('/');
        if path.is_empty() {
            return None;
        }

        match path.rsplit_once('/') {
            Some((parent, file)) => {
                let parent = parent.trim_end_matches('/');
                Some((if parent.is_empty() { "/" } else { parent }, file))
            }
            None => Some(("", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skip_empty() {
        assert_eq!("/a//b/".components(), ["a", "b"]);
        assert_eq!("a/b".components(), ["a", "b"]);
        assert!("/".components().is_empty());
        assert!("".components().is_empty());
        assert_eq!("/./..".components(), [".", ".."]);
    }

    #[test]
    fn parent_file() {
        assert_eq!("/a/f.txt".parent_file(), Some(("/a", "f.txt")));
        assert_eq!("/f.txt".parent_file(), Some(("/", "f.txt")));
        assert_eq!("/a/b/".parent_file(), Some(("/a", "b")));
        assert_eq!("//a".parent_file(), Some(("/", "a")));
        assert_eq!("a/b".parent_file(), Some(("a", "b")));
        assert_eq!("f".parent_file(), Some(("", "f")));
        assert_eq!("/".parent_file(), None);
        assert_eq!("".parent_file(), None);
    }

    #[test]
    fn absolute() {
        assert!("/a".is_absolute());
        assert!("a".is_relative());
    }
}
