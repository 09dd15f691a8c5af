//! Tab-separated rendering of a sheet's printable area.

use std::io::{self, Write};

use crate::cell::Cell;
use crate::formula::FormulaEngine;
use crate::position::Position;
use crate::sheet::Sheet;

impl<E: FormulaEngine> Sheet<E> {
    /// Write every cell's value, one line per row, fields separated by tabs
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |pos, _| {
            self.get_value(pos)
                .ok()
                .flatten()
                .map(|value| value.as_text())
                .unwrap_or_default()
        })
    }

    /// Write every cell's text, one line per row, fields separated by tabs
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |_, cell| cell.text())
    }

    fn print_with<W, F>(&self, out: &mut W, mut field: F) -> io::Result<()>
    where
        W: Write,
        F: FnMut(Position, &Cell<E::Formula>) -> String,
    {
        let size = self.get_printable_size();

        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell) = self.populated(pos) {
                    out.write_all(field(pos, cell).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }

        Ok(())
    }
}
