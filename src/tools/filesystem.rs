//! Filesystem collaborator - read, write and edit files in the workspace

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Error;
use crate::Result;

use super::edit::replace_once;
use super::{FileSystem, EDIT_FILE, READ_FILE, WRITE_FILE};

/// File access rooted at the workspace. Relative paths resolve against it.
pub struct LocalFileSystem {
    workspace: PathBuf,
}

impl LocalFileSystem {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace.join(p)
        }
    }
}

fn failure(tool: &str, message: String) -> Error {
    Error::ToolExecution {
        tool: tool.to_string(),
        message,
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &str) -> Result<String> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| failure(READ_FILE, format!("Failed to read {}: {}", path, e)))
    }

    async fn write(&self, path: &str, content: &str) -> Result<String> {
        let full = self.resolve(path);

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failure(WRITE_FILE, format!("Failed to create directory: {}", e)))?;
        }

        tokio::fs::write(&full, content)
            .await
            .map_err(|e| failure(WRITE_FILE, format!("Failed to write {}: {}", path, e)))?;

        Ok(format!("Successfully wrote {} bytes to {}", content.len(), path))
    }

    async fn replace(&self, path: &str, old_text: &str, new_text: &str) -> Result<String> {
        let full = self.resolve(path);
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| failure(EDIT_FILE, format!("Failed to read {}: {}", path, e)))?;

        let updated = replace_once(&content, old_text, new_text)?;

        tokio::fs::write(&full, updated)
            .await
            .map_err(|e| failure(EDIT_FILE, format!("Failed to write {}: {}", path, e)))?;

        Ok(format!("Successfully replaced 1 occurrence in {}", path))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_write_file() {
        let tmp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(tmp.path().to_path_buf());

        assert!(!fs.exists("nested/test.txt").await);
        let status = fs.write("nested/test.txt", "Hello, World!").await.unwrap();
        assert!(status.contains("Successfully wrote 13 bytes"));
        assert!(fs.exists("nested/test.txt").await);

        let content = fs.read("nested/test.txt").await.unwrap();
        assert_eq!(content, "Hello, World!");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let tmp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(tmp.path().to_path_buf());
        let err = fs.read("missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_replace_single_occurrence() {
        let tmp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(tmp.path().to_path_buf());
        fs.write("lib.rs", "fn a() {}\nfn b() {}\n").await.unwrap();

        fs.replace("lib.rs", "fn b()", "fn c()").await.unwrap();
        assert_eq!(fs.read("lib.rs").await.unwrap(), "fn a() {}\nfn c() {}\n");
    }

    #[tokio::test]
    async fn test_replace_leaves_file_untouched_on_ambiguity() {
        let tmp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(tmp.path().to_path_buf());
        fs.write("lib.rs", "x\nx\n").await.unwrap();

        assert!(fs.replace("lib.rs", "x", "y").await.is_err());
        assert_eq!(fs.read("lib.rs").await.unwrap(), "x\nx\n");
    }
}
