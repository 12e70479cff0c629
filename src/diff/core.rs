use std::collections::BTreeMap;

use unicode_width::UnicodeWidthChar;

use crate::geometry::Size;

const RESET: &str = "\x1b[0m";

/// Sparse grid view of one rendered frame: (row, column) to a
/// style-prefixed character. Every populated cell carries its fully
/// resolved style run, so any cell can be redrawn standalone without
/// replaying earlier cells' styles.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferMap {
    rows: BTreeMap<u16, BTreeMap<u16, String>>,
    /// Row counter value after the scan (1-based).
    scanned_rows: u16,
    /// Column counter value after the scan: one past the last recorded
    /// cell of the final line.
    scanned_cols: u16,
}

impl BufferMap {
    /// Scan a frame string into a buffer map. Newlines reset the column
    /// and advance the row; `ESC[0m` clears the running style
    /// accumulator; any other escape run appends to it; everything else
    /// is recorded as accumulator + character. Columns advance by
    /// display width so wide glyphs occupy two cells.
    pub fn scan(frame: &str) -> Self {
        let mut map = Self {
            rows: BTreeMap::new(),
            scanned_rows: 1,
            scanned_cols: 1,
        };

        let mut row: u16 = 1;
        let mut column: u16 = 1;
        let mut style = String::new();

        let mut chars = frame.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\n' {
                column = 1;
                row = row.saturating_add(1);
                continue;
            }

            if ch == '\x1b' {
                let sequence = read_escape(&mut chars);
                if sequence == RESET {
                    style.clear();
                } else {
                    style.push_str(&sequence);
                }
                continue;
            }

            let mut cell = String::with_capacity(style.len() + ch.len_utf8());
            cell.push_str(&style);
            cell.push(ch);
            map.rows.entry(row).or_default().insert(column, cell);

            let advance = ch.width().unwrap_or(0).max(1) as u16;
            column = column.saturating_add(advance);
        }

        map.scanned_rows = row;
        map.scanned_cols = column;
        map
    }

    pub fn cell(&self, row: u16, column: u16) -> Option<&str> {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(&column))
            .map(String::as_str)
    }

    /// Highest populated row, zero for an empty map.
    pub fn max_row(&self) -> u16 {
        self.rows.keys().next_back().copied().unwrap_or(0)
    }
}

/// Consume one escape sequence following an already-consumed ESC byte
/// and return it whole. CSI sequences run to their final byte; anything
/// else is treated as a two-byte sequence.
fn read_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut sequence = String::from('\x1b');
    let Some(&next) = chars.peek() else {
        return sequence;
    };
    sequence.push(next);
    chars.next();

    if next == '[' {
        for ch in chars.by_ref() {
            sequence.push(ch);
            if ('\u{40}'..='\u{7e}').contains(&ch) {
                break;
            }
        }
    }

    sequence
}

/// Stateful frame differ. Holds exactly one previous [`BufferMap`] and
/// the last known terminal dimensions; each [`diff`](AnsiDiffer::diff)
/// call replaces the previous map with the new one.
pub struct AnsiDiffer {
    previous: Option<BufferMap>,
    columns: u16,
    rows: u16,
}

impl AnsiDiffer {
    pub fn new(size: Size) -> Self {
        Self {
            previous: None,
            columns: size.width,
            rows: size.height,
        }
    }

    /// Record new terminal dimensions and drop the previous map, so the
    /// next diff is a full redraw.
    pub fn update_size(&mut self, size: Size) {
        self.columns = size.width;
        self.rows = size.height;
        self.previous = None;
    }

    pub fn size(&self) -> Size {
        Size::new(self.columns, self.rows)
    }

    /// Diff a freshly rendered frame against the stored previous one
    /// and return the terminal patch. With no previous frame the input
    /// is returned unchanged.
    pub fn diff(&mut self, frame: &str) -> String {
        let map = BufferMap::scan(frame);

        let Some(previous) = self.previous.take() else {
            self.previous = Some(map);
            return frame.to_string();
        };

        let scan_rows = map.scanned_rows.min(self.rows);
        let scan_cols = map.scanned_cols.min(self.columns);

        let mut patch = String::new();
        let mut last_row: u16 = 0;
        let mut last_col: u16 = 0;

        for r in 1..=scan_rows {
            let Some(current_row) = map.rows.get(&r) else {
                continue;
            };

            let Some(previous_row) = previous.rows.get(&r) else {
                // Whole row is new; emit it in one positioned run.
                patch.push_str(&format!("\x1b[{r};1H"));
                for cell in current_row.values() {
                    patch.push_str(cell);
                }
                patch.push_str(RESET);
                continue;
            };

            let mut emitted = false;
            for c in 1..=scan_cols {
                let Some(cell) = current_row.get(&c) else {
                    continue;
                };
                if previous_row.get(&c) == Some(cell) {
                    continue;
                }

                if last_row == r && last_col + 1 == c {
                    // Horizontally adjacent to the previous emission;
                    // the cursor is already in place.
                    patch.push_str(cell);
                } else {
                    patch.push_str(RESET);
                    patch.push_str(&format!("\x1b[{r};{c}H"));
                    patch.push_str(cell);
                }

                last_row = r;
                last_col = c;
                emitted = true;
            }

            if emitted {
                patch.push_str(RESET);
            }
        }

        // Content shrank: clear everything below the new extent.
        if scan_rows < self.rows && previous.max_row() > scan_rows {
            patch.push_str(&format!("\x1b[{};1H{RESET}\x1b[0J", scan_rows + 1));
        }

        self.previous = Some(map);
        patch
    }
}
