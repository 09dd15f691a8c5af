use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::cell::{Cell, CellValue, Evaluated};
use crate::config::SheetConfig;
use crate::dependency::DependencyGraph;
use crate::error::{FormulaError, SheetError, SheetResult};
use crate::formula::{Formula, FormulaEngine};
use crate::position::{Position, Size};

/// A grid of cells kept consistent under edits.
///
/// The sheet owns every cell, the reverse dependency index, and the per-row and
/// per-column occupancy counters behind [`Sheet::get_printable_size`]. All
/// mutation goes through [`Sheet::set_cell`] and [`Sheet::clear_cell`]; a call
/// that fails changes nothing.
///
/// Reads lazily fill formula caches through interior mutability, so a sheet is
/// meant for single-threaded use.
#[derive(Debug)]
pub struct Sheet<E: FormulaEngine> {
    engine: E,
    config: SheetConfig,
    /// Sparse storage - only populated positions are stored
    cells: HashMap<Position, Cell<E::Formula>>,
    graph: DependencyGraph,
    /// row -> number of populated cells in that row
    row_counts: BTreeMap<i32, usize>,
    /// col -> number of populated cells in that column
    col_counts: BTreeMap<i32, usize>,
}

impl<E: FormulaEngine> Sheet<E> {
    /// Create an empty sheet evaluating formulas with `engine`
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, SheetConfig::default())
    }

    pub fn with_config(engine: E, config: SheetConfig) -> Self {
        Self {
            engine,
            config,
            cells: HashMap::new(),
            graph: DependencyGraph::new(),
            row_counts: BTreeMap::new(),
            col_counts: BTreeMap::new(),
        }
    }

    /// Set a cell from user input.
    ///
    /// The input is classified as empty, text or formula. A formula that fails
    /// to parse or that would make any cell depend on itself is rejected and
    /// the sheet is left untouched. On success every cached value downstream of
    /// `pos` is invalidated.
    pub fn set_cell(&mut self, pos: Position, text: impl Into<String>) -> SheetResult<()> {
        ensure_valid(pos)?;
        let text = text.into();

        if let Some(current) = self.cells.get(&pos) {
            if current.raw_text() == text {
                return Ok(());
            }
        }

        let cell = Cell::parse(text, &self.engine).map_err(|e| {
            debug!(%pos, error = %e, "rejected formula");
            SheetError::from(e)
        })?;

        if self.graph.would_create_cycle(pos, cell.referenced_positions()) {
            debug!(%pos, "rejected circular reference");
            return Err(SheetError::CircularDependency(pos));
        }

        let new_refs = cell.referenced_positions().to_vec();
        match self.cells.insert(pos, cell) {
            Some(old) => {
                self.graph
                    .replace_edges(pos, old.referenced_positions(), &new_refs);
            }
            None => {
                self.graph.add_edges(pos, &new_refs);
                increment(&mut self.row_counts, pos.row);
                increment(&mut self.col_counts, pos.col);
            }
        }

        debug!(%pos, refs = new_refs.len(), "set cell");
        self.invalidate_from(pos);
        Ok(())
    }

    /// Remove a cell. Dependents now read it as empty (`0` in arithmetic).
    pub fn clear_cell(&mut self, pos: Position) -> SheetResult<()> {
        ensure_valid(pos)?;

        let Some(old) = self.cells.remove(&pos) else {
            return Ok(());
        };

        self.graph.remove_edges(pos, old.referenced_positions());
        decrement(&mut self.row_counts, pos.row);
        decrement(&mut self.col_counts, pos.col);

        debug!(%pos, "cleared cell");
        self.invalidate_from(pos);
        Ok(())
    }

    /// Get the cell stored at `pos`, if populated
    pub fn get_cell(&self, pos: Position) -> SheetResult<Option<&Cell<E::Formula>>> {
        ensure_valid(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// Resolve the value at `pos`, evaluating and caching formulas as needed.
    ///
    /// Returns `None` for unpopulated positions.
    pub fn get_value(&self, pos: Position) -> SheetResult<Option<CellValue>> {
        ensure_valid(pos)?;
        let Some(cell) = self.cells.get(&pos) else {
            return Ok(None);
        };
        self.settle_precedents(pos);
        Ok(Some(self.cell_value(pos, cell, &mut EvalState::default())))
    }

    /// Text form of the cell at `pos`; empty for unpopulated positions
    pub fn get_text(&self, pos: Position) -> SheetResult<String> {
        ensure_valid(pos)?;
        Ok(self.cells.get(&pos).map(Cell::text).unwrap_or_default())
    }

    /// Whether the cell at `pos` reads any other position
    pub fn is_referenced(&self, pos: Position) -> SheetResult<bool> {
        ensure_valid(pos)?;
        Ok(self.cells.get(&pos).is_some_and(Cell::is_referenced))
    }

    /// Positions read by the cell at `pos`, in ascending order
    pub fn get_referenced_cells(&self, pos: Position) -> SheetResult<Vec<Position>> {
        ensure_valid(pos)?;
        Ok(self
            .cells
            .get(&pos)
            .map(|cell| cell.referenced_positions().to_vec())
            .unwrap_or_default())
    }

    /// Positions whose formulas read `pos` directly, in ascending order
    pub fn dependents(&self, pos: Position) -> SheetResult<Vec<Position>> {
        ensure_valid(pos)?;
        let mut dependents: Vec<Position> = self
            .graph
            .direct_dependents(pos)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        dependents.sort();
        Ok(dependents)
    }

    /// Smallest origin-anchored rectangle covering every populated cell
    pub fn get_printable_size(&self) -> Size {
        match (
            self.row_counts.last_key_value(),
            self.col_counts.last_key_value(),
        ) {
            (Some((&row, _)), Some((&col, _))) => Size::new(row + 1, col + 1),
            _ => Size::default(),
        }
    }

    /// Get the number of populated cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check if the sheet has no populated cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drop cached values at `changed` and everything downstream of it
    fn invalidate_from(&self, changed: Position) {
        let order = self.graph.invalidation_order(changed);
        let dropped = order
            .iter()
            .filter_map(|pos| self.cells.get(pos))
            .filter(|cell| cell.invalidate())
            .count();
        debug!(%changed, reached = order.len(), dropped, "invalidated caches");
    }

    /// Evaluate every stale formula that `root` depends on, precedents
    /// before dependents, so that evaluating `root` only reads cached values.
    /// The walk keeps its own stack; chain length never reaches the call stack.
    fn settle_precedents(&self, root: Position) {
        let mut visited = HashSet::new();
        // (position, precedents already queued)
        let mut pending = vec![(root, false)];
        let mut settled = 0usize;

        while let Some((pos, expanded)) = pending.pop() {
            let Some(cell) = self.cells.get(&pos) else {
                continue;
            };
            if expanded {
                if pos != root {
                    self.cell_value(pos, cell, &mut EvalState::default());
                    settled += 1;
                }
                continue;
            }
            if !cell.is_stale() || !visited.insert(pos) {
                continue;
            }

            pending.push((pos, true));
            for &referenced in cell.referenced_positions().iter().rev() {
                if !visited.contains(&referenced) {
                    pending.push((referenced, false));
                }
            }
        }

        if settled > 0 {
            trace!(%root, settled, "settled precedents");
        }
    }

    /// Value of a populated cell.
    ///
    /// Nested evaluation is bounded by `max_eval_depth`; past it, or on
    /// re-entry, the cell reads as `#ERROR!`. Such results, and everything
    /// computed from them, are not cached.
    fn cell_value(
        &self,
        pos: Position,
        cell: &Cell<E::Formula>,
        state: &mut EvalState,
    ) -> CellValue {
        cell.value_with(|formula| {
            if state.stack.len() >= self.config.max_eval_depth || state.stack.contains(&pos) {
                warn!(%pos, depth = state.stack.len(), "formula evaluation guard tripped");
                state.interrupted = true;
                return Evaluated::Provisional(CellValue::Error(FormulaError::Other));
            }

            trace!(%pos, "evaluating formula");
            state.stack.push(pos);
            let result = formula.evaluate(&mut |referenced| self.resolve(referenced, state));
            state.stack.pop();

            if state.interrupted {
                Evaluated::Provisional(result.into())
            } else {
                Evaluated::Final(result.into())
            }
        })
    }

    /// Numeric view of a referenced position, as a formula sees it
    fn resolve(&self, pos: Position, state: &mut EvalState) -> Result<f64, FormulaError> {
        if !pos.is_valid() {
            return Err(FormulaError::Ref);
        }
        match self.cells.get(&pos) {
            None => Ok(0.0),
            Some(cell) => self.cell_value(pos, cell, state).to_number(),
        }
    }

    /// Populated cell at `pos` without the bounds check
    pub(crate) fn populated(&self, pos: Position) -> Option<&Cell<E::Formula>> {
        self.cells.get(&pos)
    }
}

/// Bookkeeping for one top-level evaluation
#[derive(Debug, Default)]
struct EvalState {
    /// Formula cells being evaluated, outermost first
    stack: Vec<Position>,
    /// Set once the guard has cut any evaluation short
    interrupted: bool,
}

fn ensure_valid(pos: Position) -> SheetResult<()> {
    if pos.is_valid() {
        Ok(())
    } else {
        Err(SheetError::InvalidPosition(pos))
    }
}

fn increment(counts: &mut BTreeMap<i32, usize>, key: i32) {
    *counts.entry(key).or_insert(0) += 1;
}

fn decrement(counts: &mut BTreeMap<i32, usize>, key: i32) {
    if let Entry::Occupied(mut entry) = counts.entry(key) {
        *entry.get_mut() -= 1;
        if *entry.get() == 0 {
            entry.remove();
        }
    }
}
