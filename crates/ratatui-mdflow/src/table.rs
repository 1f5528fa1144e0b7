//! Two-phase column sizing for Markdown tables.
//!
//! Phase 1 measures every cell's intrinsic width while the table stays hidden. The widths are
//! committed exactly once, either when every cell has reported ([`CommitReason::FullCoverage`])
//! or when the fallback delay runs out ([`CommitReason::FallbackTimeout`]). Phase 2 draws the
//! table with the committed widths and never measures again.
//!
//! Time is passed in explicitly (`now: Instant`) so hosts can drive the fallback from their own
//! frame clock and tests can fast-forward it.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use crate::ast::CellAlign;
use crate::ast::MarkdownNode;
use crate::ast::NodeType;

/// Header cells, body rows and per-column alignment of a `table` node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableData<'a> {
    pub headers: Vec<&'a MarkdownNode>,
    pub rows: Vec<Vec<&'a MarkdownNode>>,
    pub alignments: Vec<CellAlign>,
}

impl<'a> TableData<'a> {
    pub fn extract(table: &'a MarkdownNode) -> Self {
        let mut data = TableData::default();
        for section in &table.children {
            match section.node_type {
                NodeType::TableHead => {
                    for row in rows_of(section) {
                        data.headers.extend(cells_of(row));
                    }
                }
                NodeType::TableBody => {
                    for row in rows_of(section) {
                        let cells: Vec<_> = cells_of(row).collect();
                        if !cells.is_empty() {
                            data.rows.push(cells);
                        }
                    }
                }
                _ => {}
            }
        }
        data.alignments = data
            .headers
            .iter()
            .map(|cell| cell.align.unwrap_or_default())
            .collect();
        data
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Number of measurements that make up full coverage.
    pub fn expected_measurements(&self) -> usize {
        expected_measurements(self.column_count(), self.rows.len())
    }
}

fn rows_of(section: &MarkdownNode) -> impl Iterator<Item = &MarkdownNode> {
    section
        .children
        .iter()
        .filter(|n| n.node_type == NodeType::TableRow)
}

fn cells_of(row: &MarkdownNode) -> impl Iterator<Item = &MarkdownNode> {
    row.children
        .iter()
        .filter(|n| n.node_type == NodeType::TableCell)
}

fn expected_measurements(column_count: usize, row_count: usize) -> usize {
    column_count + row_count * column_count
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKey {
    Header { col: usize },
    Body { row: usize, col: usize },
}

impl CellKey {
    pub fn col(self) -> usize {
        match self {
            CellKey::Header { col } | CellKey::Body { col, .. } => col,
        }
    }
}

/// Sizing policy. Widths are terminal cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSizing {
    /// Added to the widest measured cell of a column.
    pub padding: u16,
    pub min_column_width: u16,
    /// How long phase 1 may wait for missing measurements.
    pub fallback_delay: Duration,
    /// Width of a column the committed widths do not cover.
    pub fallback_column_width: u16,
}

impl TableSizing {
    /// Constants of the pixel-based reference layout.
    pub fn reference() -> Self {
        Self {
            padding: 32,
            min_column_width: 100,
            fallback_delay: Duration::from_millis(400),
            fallback_column_width: 120,
        }
    }
}

impl Default for TableSizing {
    fn default() -> Self {
        Self {
            padding: 2,
            min_column_width: 3,
            fallback_delay: Duration::from_millis(400),
            fallback_column_width: 12,
        }
    }
}

/// `max(padding + widest measured cell, min_column_width)` per column. Unmeasured cells count
/// as zero.
pub fn compute_column_widths(
    column_count: usize,
    measured: &HashMap<CellKey, u16>,
    sizing: &TableSizing,
) -> Vec<u16> {
    let mut widest = vec![0u16; column_count];
    for (key, width) in measured {
        if let Some(w) = widest.get_mut(key.col()) {
            *w = (*w).max(*width);
        }
    }
    widest
        .into_iter()
        .map(|w| sizing.padding.saturating_add(w).max(sizing.min_column_width))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitReason {
    FullCoverage,
    FallbackTimeout,
}

impl CommitReason {
    fn as_str(self) -> &'static str {
        match self {
            CommitReason::FullCoverage => "full_coverage",
            CommitReason::FallbackTimeout => "fallback_timeout",
        }
    }
}

/// Measurement state of one table instance.
#[derive(Clone, Debug)]
pub struct TableLayout {
    column_count: usize,
    row_count: usize,
    sizing: TableSizing,
    measured: HashMap<CellKey, u16>,
    widths: Option<Vec<u16>>,
    deadline: Option<Instant>,
    torn_down: bool,
}

impl TableLayout {
    pub fn new(column_count: usize, row_count: usize, sizing: TableSizing, now: Instant) -> Self {
        Self {
            column_count,
            row_count,
            sizing,
            measured: HashMap::new(),
            widths: None,
            deadline: now.checked_add(sizing.fallback_delay),
            torn_down: false,
        }
    }

    /// Updates the expected cell grid while still measuring, e.g. when a streamed table grows.
    pub fn reshape(&mut self, column_count: usize, row_count: usize) {
        if self.is_committed() || self.torn_down {
            return;
        }
        self.column_count = column_count;
        self.row_count = row_count;
        self.measured.retain(|key, _| match *key {
            CellKey::Header { col } => col < column_count,
            CellKey::Body { row, col } => row < row_count && col < column_count,
        });
    }

    /// Records a measurement. Returns `true` when this call committed the widths.
    pub fn on_layout(&mut self, key: CellKey, width: u16) -> bool {
        if self.is_committed() || self.torn_down {
            return false;
        }
        let in_range = match key {
            CellKey::Header { col } => col < self.column_count,
            CellKey::Body { row, col } => row < self.row_count && col < self.column_count,
        };
        if !in_range {
            return false;
        }
        self.measured.insert(key, width);
        if self.measured.len() >= expected_measurements(self.column_count, self.row_count) {
            self.commit(CommitReason::FullCoverage);
            return true;
        }
        false
    }

    /// Commits with whatever was measured once the fallback deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_committed() || self.torn_down {
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.commit(CommitReason::FallbackTimeout);
                true
            }
            _ => false,
        }
    }

    fn commit(&mut self, reason: CommitReason) {
        let widths = compute_column_widths(self.column_count, &self.measured, &self.sizing);
        debug!(
            reason = reason.as_str(),
            measured = self.measured.len(),
            widths = ?widths,
            "table widths committed"
        );
        self.widths = Some(widths);
        self.measured = HashMap::new();
        self.deadline = None;
    }

    pub fn is_committed(&self) -> bool {
        self.widths.is_some()
    }

    pub fn column_widths(&self) -> Option<&[u16]> {
        self.widths.as_deref()
    }

    pub fn width_for(&self, col: usize) -> u16 {
        self.widths
            .as_ref()
            .and_then(|w| w.get(col).copied())
            .unwrap_or(self.sizing.fallback_column_width)
    }

    /// When the fallback commit fires, if it is still pending.
    pub fn deadline(&self) -> Option<Instant> {
        if self.torn_down { None } else { self.deadline }
    }

    pub fn measured_count(&self) -> usize {
        self.measured.len()
    }

    /// Discards measurements and disarms the fallback; nothing commits afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        trace!(
            committed = self.is_committed(),
            measured = self.measured.len(),
            "table layout torn down"
        );
        self.torn_down = true;
        self.measured = HashMap::new();
        self.deadline = None;
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }
}

/// Table layouts of one view, keyed by the table's position among the document's tables.
///
/// The ordinal is stable while a streamed document grows, so a table keeps its committed widths
/// across re-parses.
#[derive(Clone, Debug, Default)]
pub struct TableRegistry {
    sizing: TableSizing,
    layouts: BTreeMap<usize, TableLayout>,
    seen: usize,
}

impl TableRegistry {
    pub fn new(sizing: TableSizing) -> Self {
        Self {
            sizing,
            layouts: BTreeMap::new(),
            seen: 0,
        }
    }

    pub fn sizing(&self) -> TableSizing {
        self.sizing
    }

    pub fn begin_pass(&mut self) {
        self.seen = 0;
    }

    /// Layout for the next table of the current pass, created on first sight.
    pub fn next_table(
        &mut self,
        column_count: usize,
        row_count: usize,
        now: Instant,
    ) -> Option<&mut TableLayout> {
        if column_count == 0 {
            return None;
        }
        let ordinal = self.seen;
        self.seen += 1;
        let sizing = self.sizing;
        let layout = self
            .layouts
            .entry(ordinal)
            .or_insert_with(|| TableLayout::new(column_count, row_count, sizing, now));
        layout.reshape(column_count, row_count);
        Some(layout)
    }

    /// The layout [`next_table`](Self::next_table) will hand out, if it already exists.
    pub fn upcoming(&self) -> Option<&TableLayout> {
        self.layouts.get(&self.seen)
    }

    /// Tears down layouts of tables that did not appear in the pass.
    pub fn end_pass(&mut self) {
        let gone = self.layouts.split_off(&self.seen);
        for (_, mut layout) in gone {
            layout.teardown();
        }
    }

    /// Commits every pending table whose fallback deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for layout in self.layouts.values_mut() {
            changed |= layout.poll(now);
        }
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.layouts.values().filter_map(TableLayout::deadline).min()
    }

    pub fn has_pending(&self) -> bool {
        self.layouts.values().any(|l| !l.is_committed())
    }

    pub fn get(&self, ordinal: usize) -> Option<&TableLayout> {
        self.layouts.get(&ordinal)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn clear(&mut self) {
        for layout in self.layouts.values_mut() {
            layout.teardown();
        }
        self.layouts.clear();
        self.seen = 0;
    }
}

impl Drop for TableRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::parser::PulldownParser;
    use pretty_assertions::assert_eq;

    fn reference_layout(cols: usize, rows: usize, now: Instant) -> TableLayout {
        TableLayout::new(cols, rows, TableSizing::reference(), now)
    }

    #[test]
    fn commit_formula_uses_padding_and_minimum() {
        let mut measured = HashMap::new();
        measured.insert(CellKey::Header { col: 0 }, 40);
        measured.insert(CellKey::Header { col: 1 }, 60);
        measured.insert(CellKey::Body { row: 0, col: 0 }, 30);
        measured.insert(CellKey::Body { row: 0, col: 1 }, 70);
        assert_eq!(
            compute_column_widths(2, &measured, &TableSizing::reference()),
            vec![100, 102]
        );
    }

    #[test]
    fn full_coverage_commits_once() {
        let now = Instant::now();
        let mut layout = reference_layout(2, 1, now);
        assert!(!layout.on_layout(CellKey::Header { col: 0 }, 40));
        assert!(!layout.on_layout(CellKey::Header { col: 1 }, 60));
        assert!(!layout.on_layout(CellKey::Body { row: 0, col: 0 }, 30));
        assert!(layout.on_layout(CellKey::Body { row: 0, col: 1 }, 70));
        assert_eq!(layout.column_widths(), Some(&[100, 102][..]));

        assert!(!layout.on_layout(CellKey::Header { col: 0 }, 500));
        assert!(!layout.poll(now + Duration::from_secs(10)));
        assert_eq!(layout.column_widths(), Some(&[100, 102][..]));
        assert_eq!(layout.deadline(), None);
    }

    #[test]
    fn repeated_key_does_not_count_twice() {
        let now = Instant::now();
        let mut layout = reference_layout(2, 0, now);
        layout.on_layout(CellKey::Header { col: 0 }, 10);
        layout.on_layout(CellKey::Header { col: 0 }, 12);
        assert!(!layout.is_committed());
        assert_eq!(layout.measured_count(), 1);
    }

    #[test]
    fn out_of_range_keys_are_ignored() {
        let mut layout = reference_layout(1, 0, Instant::now());
        assert!(!layout.on_layout(CellKey::Header { col: 3 }, 10));
        assert!(!layout.on_layout(CellKey::Body { row: 0, col: 0 }, 10));
        assert_eq!(layout.measured_count(), 0);
    }

    #[test]
    fn ragged_table_commits_only_on_fallback() {
        let now = Instant::now();
        let mut layout = reference_layout(2, 1, now);
        layout.on_layout(CellKey::Header { col: 0 }, 10);
        layout.on_layout(CellKey::Header { col: 1 }, 10);
        layout.on_layout(CellKey::Body { row: 0, col: 0 }, 80);

        assert!(!layout.poll(now + Duration::from_millis(399)));
        assert!(!layout.is_committed());
        assert!(layout.poll(now + Duration::from_millis(400)));
        assert_eq!(layout.column_widths(), Some(&[112, 100][..]));
    }

    #[test]
    fn teardown_prevents_a_late_commit() {
        let now = Instant::now();
        let mut layout = reference_layout(2, 1, now);
        layout.on_layout(CellKey::Header { col: 0 }, 10);
        layout.teardown();
        assert!(!layout.poll(now + Duration::from_secs(1)));
        assert!(!layout.on_layout(CellKey::Header { col: 1 }, 10));
        assert!(!layout.is_committed());
        assert_eq!(layout.deadline(), None);
    }

    #[test]
    fn width_for_falls_back_until_committed() {
        let mut layout = TableLayout::new(1, 0, TableSizing::default(), Instant::now());
        assert_eq!(layout.width_for(0), 12);
        layout.on_layout(CellKey::Header { col: 0 }, 5);
        assert_eq!(layout.width_for(0), 7);
        assert_eq!(layout.width_for(4), 12);
    }

    #[test]
    fn extract_reads_headers_rows_and_alignment() {
        let doc = PulldownParser::new()
            .parse("| a | b |\n|:-:|--:|\n| 1 | 2 |\n| 3 | 4 |\n")
            .unwrap();
        let data = TableData::extract(&doc.children[0]);
        assert_eq!(data.column_count(), 2);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.alignments, vec![CellAlign::Center, CellAlign::Right]);
        assert_eq!(data.rows[1][0].text_content(), "3");
        assert_eq!(data.expected_measurements(), 6);
    }

    #[test]
    fn extract_skips_empty_rows_and_unknown_sections() {
        let table = MarkdownNode::with_children(
            NodeType::Table,
            vec![
                MarkdownNode::with_children(
                    NodeType::TableHead,
                    vec![MarkdownNode::with_children(
                        NodeType::TableRow,
                        vec![MarkdownNode::new(NodeType::TableCell)],
                    )],
                ),
                MarkdownNode::with_children(
                    NodeType::TableBody,
                    vec![MarkdownNode::new(NodeType::TableRow)],
                ),
                MarkdownNode::text("stray"),
            ],
        );
        let data = TableData::extract(&table);
        assert_eq!(data.column_count(), 1);
        assert!(data.rows.is_empty());
        assert_eq!(data.alignments, vec![CellAlign::Left]);
    }

    #[test]
    fn registry_keeps_instances_across_passes() {
        let now = Instant::now();
        let mut registry = TableRegistry::new(TableSizing::default());

        registry.begin_pass();
        let first = registry.next_table(1, 0, now).unwrap();
        first.on_layout(CellKey::Header { col: 0 }, 4);
        assert!(registry.next_table(0, 3, now).is_none());
        let second = registry.next_table(2, 0, now).unwrap();
        second.on_layout(CellKey::Header { col: 0 }, 4);
        registry.end_pass();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(0).unwrap().is_committed());
        assert_eq!(registry.next_deadline(), now.checked_add(Duration::from_millis(400)));

        registry.begin_pass();
        let first = registry.next_table(1, 5, now).unwrap();
        assert_eq!(first.column_widths(), Some(&[6][..]));
        registry.end_pass();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next_deadline(), None);
    }

    #[test]
    fn registry_poll_commits_pending_tables() {
        let now = Instant::now();
        let mut registry = TableRegistry::new(TableSizing::default());
        registry.begin_pass();
        registry.next_table(2, 0, now);
        registry.end_pass();
        assert!(registry.has_pending());
        assert!(!registry.poll(now));
        assert!(registry.poll(now + Duration::from_millis(400)));
        assert_eq!(registry.get(0).unwrap().column_widths(), Some(&[3, 3][..]));
    }
}
