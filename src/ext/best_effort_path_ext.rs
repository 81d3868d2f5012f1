use std::path::{Component, Path, PathBuf};

/// Renders a path for log lines: canonical when it exists, otherwise made
/// absolute and lexically cleaned so missing directories still read well.
pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl BestEffortPathExt for Path {
    fn best_effort_path_display(&self) -> String {
        if let Ok(canonical) = self.canonicalize() {
            return canonical.display().to_string();
        }

        let absolute = if self.is_absolute() {
            self.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(self))
                .unwrap_or_else(|_| self.to_path_buf())
        };
        lexically_normalize(&absolute).display().to_string()
    }
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }

    components.iter().collect()
}
