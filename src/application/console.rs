use async_trait::async_trait;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{Clear, ClearType};
use serde_json::Value;
use std::io::{self, Stdout, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::warn;

/// Everything the agent reports to the user, one variant per category.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Connecting,
    Connected { is_connected: bool },
    Tools { names: Vec<String> },
    ToolExecution { tool: String },
    ToolArguments { arguments: Value },
    AssistantPrompt,
    Answer { text: String },
    Error { category: &'static str, message: String },
    Exit,
}

impl Notice {
    pub fn plain_text(&self) -> String {
        match self {
            Notice::Connecting => "Connecting to MCP server...".to_string(),
            Notice::Connected { is_connected } => format!("Client connected: {is_connected}"),
            Notice::Tools { names } => format!("Tools from MCP server: [{}]", names.join(", ")),
            Notice::ToolExecution { tool } => format!("Executing function call: {tool}"),
            Notice::ToolArguments { arguments } => format!("Function arguments: {arguments}"),
            Notice::AssistantPrompt => "Assistant > ".to_string(),
            Notice::Answer { text } => text.clone(),
            Notice::Error { category, message } => format!("[{category}] {message}"),
            Notice::Exit => "Exiting...".to_string(),
        }
    }

    fn color(&self) -> Option<Color> {
        match self {
            Notice::Connecting | Notice::Connected { .. } => Some(Color::Green),
            Notice::Tools { .. } | Notice::ToolExecution { .. } | Notice::ToolArguments { .. } => {
                Some(Color::Yellow)
            }
            Notice::AssistantPrompt => Some(Color::Cyan),
            Notice::Error { .. } | Notice::Exit => Some(Color::Red),
            Notice::Answer { .. } => None,
        }
    }

    fn is_emphasized(&self) -> bool {
        !matches!(
            self,
            Notice::Connecting
                | Notice::Connected { .. }
                | Notice::Tools { .. }
                | Notice::Answer { .. }
        )
    }
}

pub trait NoticeSink: Send {
    fn notify(&mut self, notice: Notice);
}

#[async_trait]
pub trait Console: NoticeSink {
    /// Reads one line of user input. `Ok(None)` means end of input.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Line splitter that never fails on encoding: bytes that are not valid
/// UTF-8 become U+FFFD instead of an `InvalidData` error.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line without its `\n` or `\r\n` terminator; `Ok(None)` at end of input.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Console on the process's own stdin/stdout.
pub struct TerminalConsole {
    input: LineReader<BufReader<Stdin>>,
    output: Stdout,
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self {
            input: LineReader::new(BufReader::new(tokio::io::stdin())),
            output: io::stdout(),
        }
    }

    pub fn clear(&mut self) -> io::Result<()> {
        execute!(self.output, Clear(ClearType::All), MoveTo(0, 0))
    }

    fn write_notice(&mut self, notice: &Notice) -> io::Result<()> {
        let text = notice.plain_text();
        let styled = match notice.color() {
            Some(color) if notice.is_emphasized() => text.with(color).bold(),
            Some(color) => text.with(color),
            None => text.stylize(),
        };
        match notice {
            Notice::ToolExecution { .. } | Notice::AssistantPrompt => {
                writeln!(self.output)?;
            }
            _ => {}
        }
        match notice {
            Notice::AssistantPrompt => write!(self.output, "{styled}")?,
            Notice::Answer { .. } => writeln!(self.output, "{styled}\n")?,
            _ => writeln!(self.output, "{styled}")?,
        }
        self.output.flush()
    }
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeSink for TerminalConsole {
    fn notify(&mut self, notice: Notice) {
        if let Err(err) = self.write_notice(&notice) {
            warn!(%err, "failed to write to terminal");
        }
    }
}

#[async_trait]
impl Console for TerminalConsole {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        writeln!(self.output)?;
        write!(self.output, "{}", "User > ".green().bold())?;
        self.output.flush()?;
        self.input.next_line().await
    }
}
