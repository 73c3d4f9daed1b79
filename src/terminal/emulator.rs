use std::collections::HashMap;

use vte::{Params, Parser, Perform};

/// Handler for a registered OSC identifier. Receives the `;`-split
/// parameters (identifier first) and returns `true` when the sequence was
/// consumed, suppressing any default handling.
pub type OscHandler = Box<dyn FnMut(&[&[u8]]) -> bool + Send>;

/// VT100/ANSI terminal emulator wrapping the `vte` parser.
///
/// Renders inbound bytes into a cell grid and intercepts registered OSC
/// identifiers before they reach default handling, mirroring the
/// `registerOscHandler` contract of browser terminal emulators.
pub struct VtEmulator {
    parser: Parser,
    screen: Screen,
    osc_handlers: HashMap<u16, OscHandler>,
}

/// A single cell in the terminal grid.
#[derive(Clone, Debug)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
}

/// Terminal color representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::Default,
            bg: Color::Default,
            bold: false,
            underline: false,
        }
    }
}

impl VtEmulator {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            parser: Parser::new(),
            screen: Screen::new(cols, rows),
            osc_handlers: HashMap::new(),
        }
    }

    /// Register a handler for a numeric OSC identifier. At most one handler
    /// per identifier; a second registration replaces the first.
    pub fn register_osc_handler(&mut self, identifier: u16, handler: OscHandler) {
        self.osc_handlers.insert(identifier, handler);
    }

    /// Feed raw bytes from the session into the parser.
    pub fn process(&mut self, bytes: &[u8]) {
        let mut performer = EmulatorPerformer {
            screen: &mut self.screen,
            osc_handlers: &mut self.osc_handlers,
        };
        self.parser.advance(&mut performer, bytes);
    }

    /// Resize the emulator grid, clamping the cursor into the new bounds.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.screen.resize(cols, rows);
    }

    pub fn cols(&self) -> usize {
        self.screen.cols
    }

    pub fn rows(&self) -> usize {
        self.screen.rows
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.screen.cursor_x, self.screen.cursor_y)
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        self.screen.cells.get(row).and_then(|r| r.get(col))
    }

    /// Text content of one screen line.
    pub fn line_text(&self, row: usize) -> String {
        match self.screen.cells.get(row) {
            Some(cells) => cells.iter().map(|c| c.ch).collect(),
            None => String::new(),
        }
    }
}

/// Screen state mutated by the performer.
struct Screen {
    cols: usize,
    rows: usize,
    cursor_x: usize,
    cursor_y: usize,
    cells: Vec<Vec<Cell>>,
    pen: Cell,
}

impl Screen {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cursor_x: 0,
            cursor_y: 0,
            cells: vec![vec![Cell::default(); cols]; rows],
            pen: Cell::default(),
        }
    }

    fn resize(&mut self, cols: usize, rows: usize) {
        self.cols = cols;
        self.rows = rows;
        self.cells.resize(rows, vec![Cell::default(); cols]);
        for row in self.cells.iter_mut() {
            row.resize(cols, Cell::default());
        }
        self.cursor_x = self.cursor_x.min(cols.saturating_sub(1));
        self.cursor_y = self.cursor_y.min(rows.saturating_sub(1));
    }

    fn scroll_up(&mut self) {
        self.cells.remove(0);
        self.cells.push(vec![Cell::default(); self.cols]);
    }

    fn line_feed(&mut self) {
        if self.cursor_y + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor_y += 1;
        }
    }

    fn put_char(&mut self, ch: char) {
        if self.cursor_x >= self.cols {
            self.cursor_x = 0;
            self.line_feed();
        }
        if self.cursor_y < self.rows && self.cursor_x < self.cols {
            let mut cell = self.pen.clone();
            cell.ch = ch;
            self.cells[self.cursor_y][self.cursor_x] = cell;
            self.cursor_x += 1;
        }
    }

    fn erase_row(&mut self, row: usize, from: usize, to: usize) {
        let cols = self.cols;
        if let Some(cells) = self.cells.get_mut(row) {
            for cell in &mut cells[from..to.min(cols)] {
                *cell = Cell::default();
            }
        }
    }

    fn apply_sgr(&mut self, code: u16) {
        match code {
            0 => self.pen = Cell::default(),
            1 => self.pen.bold = true,
            4 => self.pen.underline = true,
            22 => self.pen.bold = false,
            24 => self.pen.underline = false,
            30..=37 => self.pen.fg = Color::Indexed((code - 30) as u8),
            39 => self.pen.fg = Color::Default,
            40..=47 => self.pen.bg = Color::Indexed((code - 40) as u8),
            49 => self.pen.bg = Color::Default,
            90..=97 => self.pen.fg = Color::Indexed((code - 90 + 8) as u8),
            100..=107 => self.pen.bg = Color::Indexed((code - 100 + 8) as u8),
            _ => {}
        }
    }
}

struct EmulatorPerformer<'a> {
    screen: &'a mut Screen,
    osc_handlers: &'a mut HashMap<u16, OscHandler>,
}

impl Perform for EmulatorPerformer<'_> {
    fn print(&mut self, ch: char) {
        self.screen.put_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | 0x0b | 0x0c => self.screen.line_feed(),
            b'\r' => self.screen.cursor_x = 0,
            0x08 => self.screen.cursor_x = self.screen.cursor_x.saturating_sub(1),
            b'\t' => {
                let next_tab = (self.screen.cursor_x / 8 + 1) * 8;
                self.screen.cursor_x = next_tab.min(self.screen.cols.saturating_sub(1));
            }
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        let identifier = params
            .first()
            .and_then(|p| std::str::from_utf8(p).ok())
            .and_then(|s| s.parse::<u16>().ok());

        if let Some(id) = identifier {
            if let Some(handler) = self.osc_handlers.get_mut(&id) {
                if handler(params) {
                    return;
                }
            }
        }
        // Unhandled OSC sequences are out-of-band and never rendered.
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        let mut iter = params.iter();
        let first = iter.next().and_then(|p| p.first().copied()).unwrap_or(0);
        let second = iter.next().and_then(|p| p.first().copied()).unwrap_or(0);
        let screen = &mut *self.screen;

        match action {
            'A' => {
                let n = first.max(1) as usize;
                screen.cursor_y = screen.cursor_y.saturating_sub(n);
            }
            'B' => {
                let n = first.max(1) as usize;
                screen.cursor_y = (screen.cursor_y + n).min(screen.rows.saturating_sub(1));
            }
            'C' => {
                let n = first.max(1) as usize;
                screen.cursor_x = (screen.cursor_x + n).min(screen.cols.saturating_sub(1));
            }
            'D' => {
                let n = first.max(1) as usize;
                screen.cursor_x = screen.cursor_x.saturating_sub(n);
            }
            'H' | 'f' => {
                let row = first.max(1) as usize;
                let col = second.max(1) as usize;
                screen.cursor_y = (row - 1).min(screen.rows.saturating_sub(1));
                screen.cursor_x = (col - 1).min(screen.cols.saturating_sub(1));
            }
            'J' => match first {
                0 => {
                    screen.erase_row(screen.cursor_y, screen.cursor_x, screen.cols);
                    for y in (screen.cursor_y + 1)..screen.rows {
                        screen.erase_row(y, 0, screen.cols);
                    }
                }
                1 => {
                    for y in 0..screen.cursor_y {
                        screen.erase_row(y, 0, screen.cols);
                    }
                    screen.erase_row(screen.cursor_y, 0, screen.cursor_x + 1);
                }
                2 | 3 => {
                    for y in 0..screen.rows {
                        screen.erase_row(y, 0, screen.cols);
                    }
                }
                _ => {}
            },
            'K' => match first {
                0 => screen.erase_row(screen.cursor_y, screen.cursor_x, screen.cols),
                1 => screen.erase_row(screen.cursor_y, 0, screen.cursor_x + 1),
                2 => screen.erase_row(screen.cursor_y, 0, screen.cols),
                _ => {}
            },
            'm' => {
                if params.is_empty() {
                    screen.apply_sgr(0);
                } else {
                    for param in params.iter() {
                        for &code in param {
                            screen.apply_sgr(code);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}
    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}
