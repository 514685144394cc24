//! XDG desktop entries, the Linux counterpart of an application bundle.
//!
//! The desktop id (file name without `.desktop`) serves as the bundle
//! identifier and the entry file as the bundle path.

use directories::BaseDirs;
use log::debug;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    pub startup_wm_class: Option<String>,
    /// Basename of the first token of `Exec=`.
    pub exec_binary: Option<String>,
}

impl DesktopEntry {
    /// Parse the `[Desktop Entry]` group of a `.desktop` file.
    ///
    /// Returns `None` for anything that is not a launchable application.
    pub fn parse(path: &Path, contents: &str) -> Option<Self> {
        let id = path.file_stem()?.to_string_lossy().into_owned();

        let mut in_main_group = false;
        let mut is_application = false;
        let mut hidden = false;
        let mut name = None;
        let mut startup_wm_class = None;
        let mut exec_binary = None;

        for line in contents.lines().map(str::trim) {
            if line.starts_with('[') {
                in_main_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_main_group || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Type" => is_application = value == "Application",
                "Name" => name = Some(value.to_string()),
                "StartupWMClass" => startup_wm_class = Some(value.to_string()),
                "Hidden" => hidden = value == "true",
                "Exec" => {
                    exec_binary = value
                        .split_whitespace()
                        .next()
                        .and_then(|program| Path::new(program).file_name())
                        .map(|program| program.to_string_lossy().into_owned());
                }
                _ => {}
            }
        }

        if !is_application || hidden {
            return None;
        }

        Some(Self {
            name: name.unwrap_or_else(|| id.clone()),
            id,
            path: path.to_path_buf(),
            startup_wm_class,
            exec_binary,
        })
    }

    /// Whether this entry describes a window with the given `WM_CLASS` pair.
    fn matches_wm_class(&self, instance: &str, class: &str) -> bool {
        let eq = |a: &str, b: &str| !b.is_empty() && a.eq_ignore_ascii_case(b);

        if let Some(wm_class) = &self.startup_wm_class {
            return eq(wm_class, class) || eq(wm_class, instance);
        }

        let short_id = self.id.rsplit('.').next().unwrap_or(&self.id);
        eq(&self.id, class)
            || eq(&self.id, instance)
            || eq(short_id, class)
            || eq(short_id, instance)
            || self.exec_binary.as_deref().is_some_and(|exec| eq(exec, instance))
    }
}

/// Desktop entries found in the XDG application directories.
#[derive(Debug, Default)]
pub struct DesktopIndex {
    entries: Vec<DesktopEntry>,
}

impl DesktopIndex {
    pub fn new(entries: Vec<DesktopEntry>) -> Self {
        Self { entries }
    }

    /// Load entries from `dirs`; earlier directories shadow later ones.
    pub fn load(dirs: &[PathBuf]) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for dir in dirs {
            let Ok(read_dir) = fs::read_dir(dir) else {
                continue;
            };
            for path in read_dir.filter_map(|e| e.ok()).map(|e| e.path()) {
                if path.extension().and_then(|ext| ext.to_str()) != Some("desktop") {
                    continue;
                }
                let Ok(contents) = fs::read_to_string(&path) else {
                    continue;
                };
                if let Some(entry) = DesktopEntry::parse(&path, &contents) {
                    if seen.insert(entry.id.clone()) {
                        entries.push(entry);
                    }
                }
            }
        }

        debug!("Indexed {} desktop entries", entries.len());
        Self { entries }
    }

    /// Entries with an explicit `StartupWMClass` are preferred over guesses
    /// from the desktop id or `Exec=` line.
    pub fn lookup(&self, instance: &str, class: &str) -> Option<&DesktopEntry> {
        let explicit = self.entries.iter().find(|entry| {
            entry.startup_wm_class.is_some() && entry.matches_wm_class(instance, class)
        });
        explicit.or_else(|| {
            self.entries.iter().find(|entry| {
                entry.startup_wm_class.is_none() && entry.matches_wm_class(instance, class)
            })
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `$XDG_DATA_HOME/applications` followed by each `$XDG_DATA_DIRS/applications`.
pub fn application_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(base) = BaseDirs::new() {
        dirs.push(base.data_dir().join("applications"));
    }

    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    dirs.extend(
        data_dirs
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join("applications")),
    );
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FIREFOX: &str = "[Desktop Entry]
Type=Application
Name=Firefox
Exec=/usr/lib/firefox/firefox %u
StartupWMClass=firefox

[Desktop Action new-window]
Name=New Window
Exec=/usr/lib/firefox/firefox --new-window
";

    #[test]
    fn test_parse_application_entry() {
        let entry = DesktopEntry::parse(Path::new("/usr/share/applications/firefox.desktop"), FIREFOX)
            .unwrap();
        assert_eq!(entry.id, "firefox");
        assert_eq!(entry.name, "Firefox");
        assert_eq!(entry.startup_wm_class.as_deref(), Some("firefox"));
        assert_eq!(entry.exec_binary.as_deref(), Some("firefox"));
    }

    #[test]
    fn test_parse_skips_non_applications_and_hidden() {
        let link = "[Desktop Entry]\nType=Link\nName=Docs\nURL=https://example.com\n";
        assert!(DesktopEntry::parse(Path::new("docs.desktop"), link).is_none());

        let hidden = "[Desktop Entry]\nType=Application\nName=Old\nHidden=true\n";
        assert!(DesktopEntry::parse(Path::new("old.desktop"), hidden).is_none());
    }

    #[test]
    fn test_action_groups_do_not_override_main_group() {
        let entry = DesktopEntry::parse(Path::new("firefox.desktop"), FIREFOX).unwrap();
        assert_eq!(entry.name, "Firefox");
    }

    #[test]
    fn test_lookup_by_reverse_dns_id() {
        let nautilus = DesktopEntry::parse(
            Path::new("org.gnome.Nautilus.desktop"),
            "[Desktop Entry]\nType=Application\nName=Files\nExec=nautilus --new-window\n",
        )
        .unwrap();
        let index = DesktopIndex::new(vec![nautilus]);

        let found = index.lookup("org.gnome.Nautilus", "org.gnome.Nautilus").unwrap();
        assert_eq!(found.id, "org.gnome.Nautilus");
        assert_eq!(index.lookup("nautilus", "Nautilus").unwrap().name, "Files");
    }

    #[test]
    fn test_lookup_prefers_startup_wm_class() {
        let guess = DesktopEntry::parse(
            Path::new("code.desktop"),
            "[Desktop Entry]\nType=Application\nName=Guess\nExec=code\n",
        )
        .unwrap();
        let explicit = DesktopEntry::parse(
            Path::new("visual-studio-code.desktop"),
            "[Desktop Entry]\nType=Application\nName=VS Code\nExec=code\nStartupWMClass=Code\n",
        )
        .unwrap();
        let index = DesktopIndex::new(vec![guess, explicit]);

        assert_eq!(index.lookup("code", "Code").unwrap().id, "visual-studio-code");
    }

    #[test]
    fn test_lookup_misses_unknown_class() {
        let index = DesktopIndex::new(Vec::new());
        assert!(index.lookup("xterm", "XTerm").is_none());
    }

    #[test]
    fn test_load_shadows_later_directories() {
        let user = tempdir().unwrap();
        let system = tempdir().unwrap();
        fs::write(
            user.path().join("editor.desktop"),
            "[Desktop Entry]\nType=Application\nName=User Editor\n",
        )
        .unwrap();
        fs::write(
            system.path().join("editor.desktop"),
            "[Desktop Entry]\nType=Application\nName=System Editor\n",
        )
        .unwrap();
        fs::write(system.path().join("README"), "not an entry").unwrap();

        let index = DesktopIndex::load(&[user.path().to_path_buf(), system.path().to_path_buf()]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("editor", "Editor").unwrap().name, "User Editor");
    }
}
