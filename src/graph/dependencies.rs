//! File-level dependency graph built from imports, includes and copybooks.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::analysis::{Dependency, Language, SourceFile};

/// One file and the files it is linked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDependencies {
    pub file: String,
    pub language: Language,
    /// Import targets as written, deduplicated in first-seen order.
    pub imports: Vec<String>,
    /// Scanned files whose imports resolve to this file.
    pub imported_by: Vec<String>,
}

/// Directed file graph keyed by file id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub files: IndexMap<String, FileDependencies>,
    pub total_files: usize,
    /// Sum of distinct imports over all files.
    pub total_dependencies: usize,
}

/// Candidate path suffix an import target resolves to.
///
/// Python dotted modules map to `a/b.py`; every other language names the
/// file directly.
fn resolution_suffix(target: &str, language: Language) -> String {
    match language {
        Language::Python => format!("{}.py", target.trim_start_matches('.').replace('.', "/")),
        _ => target.to_string(),
    }
}

/// Whether `file` ends with `suffix` on a path component boundary.
fn ends_with_path(file: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    file == suffix
        || file
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('/'))
}

impl DependencyGraph {
    /// Build the graph for `files` from their extracted dependencies.
    ///
    /// Every file gets a node, even without imports. An import links to each
    /// other scanned file whose path ends with the resolved suffix or the raw
    /// target.
    pub fn build(files: &[SourceFile], dependencies: &[Dependency]) -> Self {
        let mut graph = Self::default();
        for file in files {
            graph.files.insert(
                file.path.clone(),
                FileDependencies {
                    file: file.path.clone(),
                    language: file.language,
                    imports: Vec::new(),
                    imported_by: Vec::new(),
                },
            );
        }

        let mut imports: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
        for dep in dependencies {
            if graph.files.contains_key(&dep.file_id) {
                imports
                    .entry(dep.file_id.as_str())
                    .or_default()
                    .insert(dep.target.as_str());
            }
        }

        let mut links: Vec<(String, String)> = Vec::new();
        for (importer, targets) in &imports {
            let language = graph.files[*importer].language;
            for target in targets {
                let suffix = resolution_suffix(target, language);
                for other in graph.files.keys() {
                    if other.as_str() == *importer {
                        continue;
                    }
                    if ends_with_path(other, &suffix) || ends_with_path(other, target) {
                        links.push((other.clone(), importer.to_string()));
                    }
                }
            }
            if let Some(node) = graph.files.get_mut(*importer) {
                node.imports = targets.iter().map(|t| t.to_string()).collect();
            }
        }

        for (imported, importer) in links {
            if let Some(node) = graph.files.get_mut(&imported) {
                if !node.imported_by.contains(&importer) {
                    node.imported_by.push(importer);
                }
            }
        }

        graph.total_files = graph.files.len();
        graph.total_dependencies = graph.files.values().map(|f| f.imports.len()).sum();
        tracing::debug!(
            files = graph.total_files,
            dependencies = graph.total_dependencies,
            "dependency graph built"
        );
        graph
    }

    pub fn get(&self, file: &str) -> Option<&FileDependencies> {
        self.files.get(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DependencyKind;

    fn dep(file: &str, target: &str, kind: DependencyKind) -> Dependency {
        Dependency {
            file_id: file.to_string(),
            target: target.to_string(),
            kind,
            line: 1,
        }
    }

    fn file(path: &str, language: Language) -> SourceFile {
        SourceFile::new(path, language, "x\n")
    }

    #[test]
    fn test_python_dotted_import_resolves() {
        let files = vec![
            file("app.py", Language::Python),
            file("pkg/util.py", Language::Python),
        ];
        let deps = vec![
            dep("app.py", "pkg.util", DependencyKind::Import),
            dep("app.py", "os", DependencyKind::Import),
            dep("app.py", "pkg.util", DependencyKind::Import),
        ];
        let graph = DependencyGraph::build(&files, &deps);

        assert_eq!(graph.total_files, 2);
        assert_eq!(graph.total_dependencies, 2);
        assert_eq!(graph.get("app.py").unwrap().imports, vec!["pkg.util", "os"]);
        assert_eq!(graph.get("pkg/util.py").unwrap().imported_by, vec!["app.py"]);
        assert!(graph.get("app.py").unwrap().imported_by.is_empty());
    }

    #[test]
    fn test_include_and_copybook_match_path_suffix() {
        let files = vec![
            file("src/main.c", Language::C),
            file("include/config.h", Language::C),
            file("include/myconfig.h", Language::C),
            file("batch/PAY.cbl", Language::Cobol),
            file("copy/PAYREC", Language::Cobol),
        ];
        let deps = vec![
            dep("src/main.c", "config.h", DependencyKind::LocalInclude),
            dep("batch/PAY.cbl", "PAYREC", DependencyKind::Copybook),
        ];
        let graph = DependencyGraph::build(&files, &deps);

        assert_eq!(graph.get("include/config.h").unwrap().imported_by, vec!["src/main.c"]);
        assert!(graph.get("include/myconfig.h").unwrap().imported_by.is_empty());
        assert_eq!(graph.get("copy/PAYREC").unwrap().imported_by, vec!["batch/PAY.cbl"]);
    }

    #[test]
    fn test_unscanned_files_are_ignored() {
        let files = vec![file("a.py", Language::Python)];
        let deps = vec![dep("ghost.py", "a", DependencyKind::Import)];
        let graph = DependencyGraph::build(&files, &deps);
        assert_eq!(graph.total_dependencies, 0);
        assert!(graph.get("a.py").unwrap().imported_by.is_empty());
    }
}
