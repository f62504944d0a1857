use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// URL prefix under which diagram Markdown files are served.
pub const URL_PREFIX: &str = "/diagrams";

/// Best-effort Markdown cache of diagram sections, one directory per requirement.
///
/// The diagram records stored on the requirement are authoritative; a failed
/// write here is logged and otherwise ignored.
#[derive(Clone, Debug)]
pub struct DiagramFiles {
    root: PathBuf,
}

impl DiagramFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative URL for the `index`-th diagram of a requirement.
    pub fn url_for(requirement_id: Uuid, index: usize) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}/diagram-{}-{}.md",
            URL_PREFIX,
            requirement_id,
            index + 1,
            &suffix[..8]
        )
    }

    /// Map a diagram URL to a path inside the storage root.
    ///
    /// Returns `None` for URLs outside the prefix or containing anything but
    /// plain file name components.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(URL_PREFIX)?.strip_prefix('/')?;
        if relative.is_empty() {
            return None;
        }

        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }

    /// Write one diagram file. Returns whether the write succeeded.
    pub async fn write(&self, url: &str, contents: &str) -> bool {
        let Some(path) = self.resolve(url) else {
            log::warn!("Refusing to write diagram file for unexpected URL {}", url);
            return false;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                log::warn!("Failed to create diagram directory {}: {}", parent.display(), e);
                return false;
            }
        }

        match fs::write(&path, contents).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to write diagram file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Remove every file cached for a requirement.
    pub async fn remove_requirement(&self, requirement_id: Uuid) {
        let dir = self.root.join(requirement_id.to_string());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => log::info!("Removed diagram files in {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove diagram files in {}: {}", dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_is_scoped_to_requirement() {
        let id = Uuid::new_v4();
        let url = DiagramFiles::url_for(id, 0);
        assert!(url.starts_with(&format!("/diagrams/{}/diagram-1-", id)));
        assert!(url.ends_with(".md"));
        assert_ne!(url, DiagramFiles::url_for(id, 0));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let files = DiagramFiles::new("/srv/diagrams");
        assert_eq!(
            files.resolve("/diagrams/abc/diagram-1-x.md"),
            Some(PathBuf::from("/srv/diagrams/abc/diagram-1-x.md"))
        );
        assert_eq!(files.resolve("/diagrams/../etc/passwd"), None);
        assert_eq!(files.resolve("/diagrams//etc/passwd"), None);
        assert_eq!(files.resolve("/diagramsx/abc.md"), None);
        assert_eq!(files.resolve("/other/abc.md"), None);
        assert_eq!(files.resolve("/diagrams/"), None);
    }

    #[tokio::test]
    async fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiagramFiles::new(dir.path());
        let id = Uuid::new_v4();
        let url = DiagramFiles::url_for(id, 2);

        assert!(files.write(&url, "# Title\nbody").await);
        let path = files.resolve(&url).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\nbody");

        files.remove_requirement(id).await;
        assert!(!path.exists());
    }
}
