use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// イメージディレクトリを持つ一時プロジェクト
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("images")).unwrap();
        Self { root }
    }

    /// `images/<image>/<file>` を作成
    pub fn write_dockerfile(&self, image: &str, file: &str, content: &str) {
        let dir = self.images().join(image);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_include(&self, image: &str, file: &str, content: &str) {
        let dir = self.images().join(image).join("includes");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join(".mach.yaml"), content).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn images(&self) -> PathBuf {
        self.root.path().join("images")
    }
}
