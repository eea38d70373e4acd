//! Language-specific analyzer implementations.

mod assembly;
mod c;
mod cobol;
mod python;

pub use assembly::AssemblyAnalyzer;
pub use c::CAnalyzer;
pub use cobol::CobolAnalyzer;
pub use python::PythonAnalyzer;

use super::{Language, LanguageAnalyzer};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Static storage for Python analyzer.
static PYTHON_ANALYZER: OnceCell<PythonAnalyzer> = OnceCell::new();

/// Static storage for C analyzer.
static C_ANALYZER: OnceCell<CAnalyzer> = OnceCell::new();

/// Static storage for assembly analyzer.
static ASSEMBLY_ANALYZER: OnceCell<AssemblyAnalyzer> = OnceCell::new();

/// Static storage for COBOL analyzer.
static COBOL_ANALYZER: OnceCell<CobolAnalyzer> = OnceCell::new();

/// Whether analyzers have been registered.
static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Register all available language analyzers.
///
/// This is idempotent - calling it multiple times is safe. Lookups call it
/// themselves, so explicit registration is only needed to pay the setup
/// cost up front.
pub fn register_analyzers() {
    if REGISTERED.swap(true, Ordering::SeqCst) {
        return; // Already registered
    }

    PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new);
    C_ANALYZER.get_or_init(CAnalyzer::new);
    ASSEMBLY_ANALYZER.get_or_init(AssemblyAnalyzer::new);
    COBOL_ANALYZER.get_or_init(CobolAnalyzer::new);
}

/// Get an analyzer for the given file extension (case-insensitive, no dot).
///
/// Returns None if no analyzer is registered for the extension.
pub fn get_analyzer(ext: &str) -> Option<&'static dyn LanguageAnalyzer> {
    Language::from_extension(ext).and_then(get_analyzer_for)
}

/// Get the analyzer for a language.
pub fn get_analyzer_for(language: Language) -> Option<&'static dyn LanguageAnalyzer> {
    // Ensure analyzers are registered
    register_analyzers();

    match language {
        Language::Python => PYTHON_ANALYZER.get().map(|a| a as &'static dyn LanguageAnalyzer),
        Language::C => C_ANALYZER.get().map(|a| a as &'static dyn LanguageAnalyzer),
        Language::Assembly => ASSEMBLY_ANALYZER.get().map(|a| a as &'static dyn LanguageAnalyzer),
        Language::Cobol => COBOL_ANALYZER.get().map(|a| a as &'static dyn LanguageAnalyzer),
    }
}

/// Get all registered languages.
pub fn registered_languages() -> Vec<Language> {
    Language::ALL
        .iter()
        .copied()
        .filter(|lang| get_analyzer_for(*lang).is_some())
        .collect()
}

/// Get all registered file extensions.
pub fn registered_extensions() -> Vec<&'static str> {
    registered_languages()
        .into_iter()
        .filter_map(get_analyzer_for)
        .flat_map(|a| a.file_extensions().iter().copied())
        .collect()
}
