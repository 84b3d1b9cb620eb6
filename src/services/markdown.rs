use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

pub const DEFAULT_CODE_LANGUAGE: &str = "plaintext";

/// Renderable structure of a markdown reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Vec<Span>),
    Code { language: String, code: String },
    Heading { level: u8, spans: Vec<Span> },
    Quote(Vec<Block>),
    List { start: Option<u64>, items: Vec<ListItem> },
    Table { header: Vec<Vec<Span>>, rows: Vec<Vec<Vec<Span>>> },
    Rule,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListItem {
    /// `Some` for GFM task items.
    pub checked: Option<bool>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link_url: Option<String>,
}

pub fn parse_markdown(input: &str) -> Vec<Block> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
    let mut builder = Builder::default();
    for event in Parser::new_ext(input, options) {
        builder.handle(event);
    }
    builder.finish()
}

enum Frame {
    Quote(Vec<Block>),
    List {
        start: Option<u64>,
        items: Vec<ListItem>,
    },
    Item(ListItem),
    Table {
        header: Vec<Vec<Span>>,
        rows: Vec<Vec<Vec<Span>>>,
        row: Vec<Vec<Span>>,
    },
}

#[derive(Default)]
struct Style {
    bold: u32,
    italic: u32,
    strikethrough: u32,
    link_url: Option<String>,
}

#[derive(Default)]
struct Builder {
    root: Vec<Block>,
    stack: Vec<Frame>,
    spans: Vec<Span>,
    style: Style,
    code: Option<(String, String)>,
}

impl Builder {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.code.as_mut() {
                Some((_, code)) => code.push_str(&text),
                None => self.push_span(text.into_string(), false),
            },
            Event::Code(code) => self.push_span(code.into_string(), true),
            Event::SoftBreak => self.push_span(" ".to_string(), false),
            Event::HardBreak => self.push_span("\n".to_string(), false),
            Event::Rule => {
                self.flush_spans();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                if let Some(Frame::Item(item)) = self.stack.last_mut() {
                    item.checked = Some(checked);
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { .. } => self.flush_spans(),
            Tag::Strong => self.style.bold += 1,
            Tag::Emphasis => self.style.italic += 1,
            Tag::Strikethrough => self.style.strikethrough += 1,
            Tag::Link { dest_url, .. } => self.style.link_url = Some(dest_url.into_string()),
            Tag::CodeBlock(kind) => {
                self.flush_spans();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or(DEFAULT_CODE_LANGUAGE)
                        .to_string(),
                    CodeBlockKind::Indented => DEFAULT_CODE_LANGUAGE.to_string(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::BlockQuote(_) => {
                self.flush_spans();
                self.stack.push(Frame::Quote(Vec::new()));
            }
            Tag::List(start) => {
                self.flush_spans();
                self.stack.push(Frame::List {
                    start,
                    items: Vec::new(),
                });
            }
            Tag::Item => self.stack.push(Frame::Item(ListItem::default())),
            Tag::Table(_) => {
                self.flush_spans();
                self.stack.push(Frame::Table {
                    header: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.flush_spans(),
            TagEnd::Heading(level) => {
                let spans = std::mem::take(&mut self.spans);
                self.push_block(Block::Heading {
                    level: heading_level(level),
                    spans,
                });
            }
            TagEnd::Strong => self.style.bold = self.style.bold.saturating_sub(1),
            TagEnd::Emphasis => self.style.italic = self.style.italic.saturating_sub(1),
            TagEnd::Strikethrough => {
                self.style.strikethrough = self.style.strikethrough.saturating_sub(1)
            }
            TagEnd::Link => self.style.link_url = None,
            TagEnd::CodeBlock => {
                if let Some((language, code)) = self.code.take() {
                    let code = code.trim_end_matches('\n').to_string();
                    self.push_block(Block::Code { language, code });
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_spans();
                if let Some(Frame::Quote(blocks)) = self.stack.pop() {
                    self.push_block(Block::Quote(blocks));
                }
            }
            TagEnd::Item => {
                self.flush_spans();
                if let Some(Frame::Item(item)) = self.stack.pop() {
                    if let Some(Frame::List { items, .. }) = self.stack.last_mut() {
                        items.push(item);
                    }
                }
            }
            TagEnd::List(_) => {
                self.flush_spans();
                if let Some(Frame::List { start, items }) = self.stack.pop() {
                    self.push_block(Block::List { start, items });
                }
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.spans);
                if let Some(Frame::Table { row, .. }) = self.stack.last_mut() {
                    row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(Frame::Table { header, row, .. }) = self.stack.last_mut() {
                    *header = std::mem::take(row);
                }
            }
            TagEnd::TableRow => {
                if let Some(Frame::Table { rows, row, .. }) = self.stack.last_mut() {
                    rows.push(std::mem::take(row));
                }
            }
            TagEnd::Table => {
                if let Some(Frame::Table { header, rows, .. }) = self.stack.pop() {
                    self.push_block(Block::Table { header, rows });
                }
            }
            _ => {}
        }
    }

    fn push_span(&mut self, text: String, code: bool) {
        self.spans.push(Span {
            text,
            bold: self.style.bold > 0,
            italic: self.style.italic > 0,
            strikethrough: self.style.strikethrough > 0,
            code,
            link_url: self.style.link_url.clone(),
        });
    }

    /// Turns pending inline spans into a paragraph. Inside table cells spans
    /// stay pending until the cell closes.
    fn flush_spans(&mut self) {
        if self.spans.is_empty() || matches!(self.stack.last(), Some(Frame::Table { .. })) {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        self.push_block(Block::Paragraph(spans));
    }

    fn push_block(&mut self, block: Block) {
        match self.stack.last_mut() {
            Some(Frame::Quote(blocks)) => blocks.push(block),
            Some(Frame::Item(item)) => item.blocks.push(block),
            Some(Frame::List { items, .. }) => items.push(ListItem {
                checked: None,
                blocks: vec![block],
            }),
            Some(Frame::Table { .. }) => {}
            None => self.root.push(block),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_spans();
        self.root
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Convert inline spans to a Pango markup string.
pub fn spans_to_pango_markup(spans: &[Span]) -> String {
    let mut markup = String::new();
    for span in spans {
        let mut close = Vec::new();
        if let Some(url) = &span.link_url {
            markup.push_str(&format!("<a href=\"{}\">", glib::markup_escape_text(url)));
            close.push("</a>");
        }
        for (on, open, end) in [
            (span.strikethrough, "<s>", "</s>"),
            (span.italic, "<i>", "</i>"),
            (span.bold, "<b>", "</b>"),
            (span.code, "<tt>", "</tt>"),
        ] {
            if on {
                markup.push_str(open);
                close.push(end);
            }
        }
        markup.push_str(&glib::markup_escape_text(&span.text));
        for tag in close.iter().rev() {
            markup.push_str(tag);
        }
    }
    markup
}
