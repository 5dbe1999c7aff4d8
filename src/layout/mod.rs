//! Deterministic local layout for mirrored course content.
//!
//! Path resolution is pure: [`Layout::resolve`] maps a remote
//! (course, section, module, file) tuple to [`PathSegments`] without touching
//! the filesystem. Directory creation is the sync engine's job.
//!
//! Two layouts are supported:
//!
//! - plain: `root/{course}/{section}/{module}/{file}`
//! - numbered: `root/{id}_{course}/sections/{NN}_{section}/{NNN}_{module}/{file}`

mod sanitize;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use sanitize::{DEFAULT_MAX_LEN, SanitizeMode, sanitize, sanitize_with};

use crate::moodle::{Course, Module, Section};

/// Subdirectory holding sections in the numbered layout.
const SECTIONS_DIR: &str = "sections";

/// Resolved, individually sanitized path segments for one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegments {
    /// Course directory name.
    pub course: String,
    /// Optional intermediate directory between course and sections.
    pub sections_root: Option<String>,
    /// Section directory name.
    pub section: String,
    /// Module directory name.
    pub module: String,
    /// File name.
    pub file: String,
}

impl PathSegments {
    /// Joins the directory segments (everything but the file) onto `root`.
    #[must_use]
    pub fn module_dir(&self, root: &Path) -> PathBuf {
        let mut dir = root.join(&self.course);
        if let Some(sections_root) = &self.sections_root {
            dir.push(sections_root);
        }
        dir.push(&self.section);
        dir.push(&self.module);
        dir
    }

    /// Joins all segments onto `root`.
    #[must_use]
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.module_dir(root).join(&self.file)
    }
}

/// Naming policy for the local mirror.
///
/// Holds the course alias table and the layout flags. All methods are pure
/// and deterministic, so an unchanged remote tree always maps to the same
/// local paths.
#[derive(Debug, Clone)]
pub struct Layout {
    aliases: HashMap<i64, String>,
    mode: SanitizeMode,
    numbered: bool,
    max_len: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl Layout {
    /// Creates a plain layout with the given course aliases.
    #[must_use]
    pub fn new(aliases: HashMap<i64, String>) -> Self {
        Self {
            aliases,
            mode: SanitizeMode::Basic,
            numbered: false,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Collapses whitespace runs in every segment.
    #[must_use]
    pub fn with_full_sanitizer(mut self, enabled: bool) -> Self {
        self.mode = if enabled {
            SanitizeMode::Full
        } else {
            SanitizeMode::Basic
        };
        self
    }

    /// Switches to the numbered (id/index prefixed) layout.
    #[must_use]
    pub fn with_numbering(mut self, enabled: bool) -> Self {
        self.numbered = enabled;
        self
    }

    /// Returns true when the numbered layout is active.
    #[must_use]
    pub fn is_numbered(&self) -> bool {
        self.numbered
    }

    fn segment(&self, name: &str) -> String {
        sanitize_with(name, self.max_len, self.mode)
    }

    /// Human-readable course name before sanitization.
    ///
    /// Priority: non-empty alias, the part of `full_name` after the first
    /// colon, the whole `full_name`, then `course_{id}`.
    #[must_use]
    pub fn course_display_name(&self, course: &Course) -> String {
        if let Some(alias) = self.aliases.get(&course.id)
            && !alias.trim().is_empty()
        {
            return alias.clone();
        }

        let full_name = course.full_name.as_str();
        let cleaned = match full_name.split_once(':') {
            Some((_, suffix)) => suffix.trim(),
            None => full_name.trim(),
        };
        if cleaned.is_empty() {
            format!("course_{}", course.id)
        } else {
            cleaned.to_string()
        }
    }

    /// Course directory name.
    #[must_use]
    pub fn course_folder(&self, course: &Course) -> String {
        let name = self.segment(&self.course_display_name(course));
        if self.numbered {
            format!("{}_{name}", course.id)
        } else {
            name
        }
    }

    /// Intermediate directory between the course and its sections, if any.
    #[must_use]
    pub fn sections_root(&self) -> Option<&'static str> {
        self.numbered.then_some(SECTIONS_DIR)
    }

    /// Section directory name.
    #[must_use]
    pub fn section_folder(&self, section: &Section) -> String {
        let name = self.segment(&section.name);
        if self.numbered {
            format!("{:02}_{name}", section.index)
        } else {
            name
        }
    }

    /// Module directory name; `position` is the module's index in its section.
    #[must_use]
    pub fn module_folder(&self, position: usize, module: &Module) -> String {
        let name = self.segment(&module.name);
        if self.numbered {
            format!("{position:03}_{name}")
        } else {
            name
        }
    }

    /// Local file name for a remote file name.
    #[must_use]
    pub fn file_name(&self, filename: &str) -> String {
        self.segment(filename)
    }

    /// Resolves every path segment for one remote file.
    #[must_use]
    pub fn resolve(
        &self,
        course: &Course,
        section: &Section,
        position: usize,
        module: &Module,
        filename: &str,
    ) -> PathSegments {
        PathSegments {
            course: self.course_folder(course),
            sections_root: self.sections_root().map(str::to_string),
            section: self.section_folder(section),
            module: self.module_folder(position, module),
            file: self.file_name(filename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: i64, full_name: &str) -> Course {
        Course {
            id,
            full_name: full_name.to_string(),
            ..Course::default()
        }
    }

    fn section(index: i64, name: &str) -> Section {
        Section {
            index,
            name: name.to_string(),
            ..Section::default()
        }
    }

    fn module(name: &str) -> Module {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    #[test]
    fn test_course_display_name_prefers_alias() {
        let layout = Layout::new(HashMap::from([(1678, "FMI".to_string())]));
        assert_eq!(layout.course_display_name(&course(1678, "G123: Fundamentos")), "FMI");
    }

    #[test]
    fn test_course_display_name_ignores_empty_alias() {
        let layout = Layout::new(HashMap::from([(1704, "  ".to_string())]));
        assert_eq!(layout.course_display_name(&course(1704, "X: Centros")), "Centros");
    }

    #[test]
    fn test_course_display_name_uses_suffix_after_first_colon() {
        let layout = Layout::default();
        assert_eq!(
            layout.course_display_name(&course(7, "G1: Redes: Parte II ")),
            "Redes: Parte II"
        );
    }

    #[test]
    fn test_course_display_name_without_colon_uses_full_name() {
        let layout = Layout::default();
        assert_eq!(layout.course_display_name(&course(7, "  Álgebra ")), "Álgebra");
    }

    #[test]
    fn test_course_display_name_falls_back_to_id() {
        let layout = Layout::default();
        assert_eq!(layout.course_display_name(&course(42, "")), "course_42");
        assert_eq!(layout.course_display_name(&course(43, "CODE:   ")), "course_43");
    }

    #[test]
    fn test_course_folder_is_sanitized() {
        let layout = Layout::default();
        assert_eq!(layout.course_folder(&course(1, "G: Redes/TCP")), "Redes_TCP");
    }

    #[test]
    fn test_resolve_plain_layout() {
        let layout = Layout::default();
        let segments = layout.resolve(
            &course(5, "G5: Bases de datos"),
            &section(1, "Tema 1"),
            0,
            &module("Apuntes"),
            "tema1.pdf",
        );
        assert_eq!(segments.sections_root, None);
        assert_eq!(
            segments.to_path(Path::new("dumps")),
            PathBuf::from("dumps/Bases de datos/Tema 1/Apuntes/tema1.pdf")
        );
    }

    #[test]
    fn test_resolve_numbered_layout() {
        let layout = Layout::default().with_numbering(true);
        let segments = layout.resolve(
            &course(5, "G5: Bases de datos"),
            &section(3, "Tema 3"),
            12,
            &module("Prácticas"),
            "p1.zip",
        );
        assert_eq!(
            segments.to_path(Path::new("root")),
            PathBuf::from("root/5_Bases de datos/sections/03_Tema 3/012_Prácticas/p1.zip")
        );
    }

    #[test]
    fn test_resolve_full_sanitizer_collapses_whitespace() {
        let layout = Layout::default().with_full_sanitizer(true);
        let segments = layout.resolve(
            &course(5, "Bases de datos"),
            &section(0, "General"),
            0,
            &module("Guía docente"),
            "guia docente.pdf",
        );
        assert_eq!(segments.course, "Bases_de_datos");
        assert_eq!(segments.module, "Guía_docente");
        assert_eq!(segments.file, "guia_docente.pdf");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let layout = Layout::default();
        let args = (course(9, "A: B"), section(1, "S"), module("M"));
        let first = layout.resolve(&args.0, &args.1, 0, &args.2, "f.txt");
        let second = layout.resolve(&args.0, &args.1, 0, &args.2, "f.txt");
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_never_escapes_root() {
        let layout = Layout::default();
        let segments = layout.resolve(
            &course(1, ".."),
            &section(0, "../.."),
            0,
            &module("/abs"),
            "..",
        );
        let root = Path::new("/tmp/mirror");
        let path = segments.to_path(root);
        assert!(path.starts_with(root));
        assert!(
            path.components()
                .all(|c| !matches!(c, std::path::Component::ParentDir))
        );
    }

    #[test]
    fn test_module_dir_excludes_file() {
        let layout = Layout::default();
        let segments = layout.resolve(
            &course(1, "C"),
            &section(0, "S"),
            0,
            &module("M"),
            "f.pdf",
        );
        assert_eq!(
            segments.module_dir(Path::new("r")),
            PathBuf::from("r/C/S/M")
        );
    }
}
