use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell as TableCell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::domain::{HELP_TEXT, SheetConfig};
use crate::model::Model;
use crate::table::{PaginationBar, TableRender, TableView};

pub const FILTER_BAR_HEIGHT: u16 = 1;
pub const PAGINATION_HEIGHT: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const COLUMN_WIDTH_MIN: u16 = 6;
pub const STATUS_MESSAGE_FADE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct TableUI {
    page_size_rows: usize,
}

impl TableUI {
    pub fn new(cfg: &SheetConfig) -> Self {
        Self {
            page_size_rows: cfg.page_size_rows,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let [filter_area, table_area, pagination_area, status_area] = Layout::vertical([
            Constraint::Length(FILTER_BAR_HEIGHT),
            // header, one page of rows, borders
            Constraint::Min(self.page_size_rows as u16 + 3),
            Constraint::Length(PAGINATION_HEIGHT),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.draw_filter_bar(model, frame, filter_area);

        let title = match &model.sync().state().active_file {
            Some(file) => Line::from(vec![" sheetview ".bold(), file.to_string().yellow(), " ".into()]),
            None => Line::from(" sheetview ".bold()),
        };
        let block = Block::bordered()
            .title(title.centered())
            .border_set(border::THICK);

        match model.table_view() {
            TableView::Placeholder(text) => {
                frame.render_widget(
                    Paragraph::new(text).centered().yellow().block(block),
                    table_area,
                );
            }
            TableView::Table(table) => {
                Self::draw_table(&table, model.selected_column(), frame, table_area, block);
                Self::draw_pagination(&table.pagination, frame, pagination_area);
            }
        }

        self.draw_statusline(model, frame, status_area);

        if model.show_help() {
            Self::draw_help(frame);
        }
    }

    fn draw_filter_bar(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let state = model.sync().state();
        let column = if state.filter.column.is_empty() {
            "-".to_string()
        } else {
            state.filter.column.clone()
        };
        let mode = if state.filter.is_active() {
            "filtering".green()
        } else {
            "no filter".dark_gray()
        };
        let line = Line::from(vec![
            " Column: ".into(),
            column.cyan(),
            "  Query: ".into(),
            state.filter.query.clone().cyan(),
            "  [".into(),
            mode,
            "]".into(),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_table(
        table: &TableRender,
        selected_column: usize,
        frame: &mut Frame,
        area: Rect,
        block: Block,
    ) {
        let header = Row::new(table.headers.iter().enumerate().map(|(idx, h)| {
            let style = if idx == selected_column {
                Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            TableCell::from(format!("{} {}", h.name, h.indicator.symbol())).style(style)
        }));

        let rows = table.rows.iter().enumerate().map(|(idx, row)| {
            let style = if idx % 2 == 1 {
                Style::default().dark_gray()
            } else {
                Style::default()
            };
            Row::new(row.iter().map(|v| TableCell::from(v.as_str()))).style(style)
        });

        let widths = table.headers.iter().enumerate().map(|(idx, h)| {
            let longest = table
                .rows
                .iter()
                .filter_map(|r| r.get(idx))
                .map(|v| v.chars().count())
                .chain(std::iter::once(h.name.chars().count() + 2))
                .max()
                .unwrap_or(0);
            Constraint::Min((longest as u16).max(COLUMN_WIDTH_MIN))
        });

        let widget = Table::new(rows, widths).header(header).block(block);
        frame.render_widget(widget, area);
    }

    fn draw_pagination(bar: &PaginationBar, frame: &mut Frame, area: Rect) {
        let enabled = |on: bool, text: &'static str| -> Span<'static> {
            if on { text.bold() } else { text.dark_gray() }
        };
        let line = Line::from(vec![
            enabled(bar.previous_enabled, "◀ Previous"),
            format!(
                "   Page {} of {}   ",
                bar.display_page_number, bar.total_pages
            )
            .into(),
            enabled(bar.next_enabled, "Next ▶"),
        ]);
        frame.render_widget(Paragraph::new(line).centered(), area);
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if let Some((prompt, input)) = model.input_line() {
            let line = Line::from(vec![prompt.bold(), input.input.clone().into()]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + input.cursor_pos) as u16;
            frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
        } else {
            let message = Paragraph::new(model.status_message()).italic();
            if model.last_status_message_update().elapsed() > STATUS_MESSAGE_FADE {
                frame.render_widget(message.dark_gray(), area);
            } else {
                frame.render_widget(message, area);
            }
        }
    }

    fn draw_help(frame: &mut Frame) {
        let area = frame.area();
        let [_, vertical, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(HELP_TEXT.lines().count() as u16 + 2),
            Constraint::Fill(1),
        ])
        .areas(area);
        let [_, popup, _] = Layout::horizontal([
            Constraint::Fill(1),
            Constraint::Length(48),
            Constraint::Fill(1),
        ])
        .areas(vertical);

        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(HELP_TEXT)
                .wrap(Wrap { trim: false })
                .block(Block::bordered().title(" Help ".bold())),
            popup,
        );
    }
}
