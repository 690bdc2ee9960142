//! Built-in metric parsers.
//!
//! | Parser | Default | Metrics |
//! |--------|---------|---------|
//! | [`lines_of_code`] | yes | `TotalLinesOfCode`, `TotalLinesOfCode_<Language>` |
//! | `todo` | yes | `TODOCount` |
//! | `python_imports` | yes | `PythonImportCount` |
//! | `binary_files` | yes | `BinaryFileCount` |
//! | `symlinks` | yes | `SymlinkCount` |
//! | `file_count` | no | `TotalFileCount` |

pub mod files;
pub mod lines_of_code;
pub mod patterns;

pub use files::FileKindParser;
pub use lines_of_code::LinesOfCodeParser;
pub use patterns::LinePatternParser;

use super::ParserRegistry;

pub fn register_builtins(registry: &mut ParserRegistry) {
    registry.register("lines_of_code", true, || Box::new(LinesOfCodeParser::new()));
    registry.register("todo", true, || Box::new(LinePatternParser::todo()));
    registry.register("python_imports", true, || {
        Box::new(LinePatternParser::python_imports())
    });
    registry.register("binary_files", true, || Box::new(FileKindParser::binary_files()));
    registry.register("symlinks", true, || Box::new(FileKindParser::symlinks()));
    registry.register("file_count", false, || Box::new(FileKindParser::file_count()));
}
