pub mod cell;
pub mod config;
pub mod dependency;
pub mod error;
pub mod formula;
pub mod position;
pub mod print;
pub mod sheet;

#[cfg(test)]
mod testing;

pub use cell::{Cell, CellContent, CellKind, CellValue, ESCAPE_SIGN, FORMULA_SIGN};
pub use config::{ConfigError, SheetConfig};
pub use dependency::DependencyGraph;
pub use error::{FormulaError, FormulaSyntaxError, ParsePositionError, SheetError, SheetResult};
pub use formula::{Formula, FormulaEngine, Resolver};
pub use position::{col_from_label, col_to_label, Position, Size};
pub use sheet::Sheet;
