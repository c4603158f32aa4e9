//! Maps SourceForge download paths onto the mirror network.
//!
//! Only one inbound shape is understood:
//! `/projects/<project>/files/<path...>/download`, which becomes
//! `https://<mirror>/project/<project>/<path...>?viasf=1`.

use url::Url;

/// A parsed download request, independent of the mirror it is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub project: String,
    pub file_path: String,
}

impl ProxyTarget {
    /// Returns `None` for any path that is not a well-formed download path.
    pub fn from_path(path: &str) -> Option<Self> {
        if !path.contains("/projects/") || !path.contains("/files/") {
            return None;
        }

        let segments: Vec<&str> = path.split('/').collect();
        let (last, rest) = segments.split_last()?;
        if *last != "download" {
            return None;
        }

        let projects_idx = rest.iter().position(|s| *s == "projects")?;
        let files_idx = rest.iter().position(|s| *s == "files")?;

        // project name must sit strictly between the two markers
        if files_idx != projects_idx + 2 {
            return None;
        }

        let project = rest[projects_idx + 1];
        let file_segments = &rest[files_idx + 1..];
        if project.is_empty() || file_segments.last().map_or(true, |s| s.is_empty()) {
            return None;
        }

        Some(Self {
            project: project.to_string(),
            file_path: file_segments.join("/"),
        })
    }

    pub fn url(&self, mirror_host: &str) -> String {
        format!(
            "https://{}/project/{}/{}?viasf=1",
            mirror_host, self.project, self.file_path
        )
    }
}

/// Last path segment of `url`, the name a download is counted and saved under.
pub fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
}
