// Time partitioning: narrow a table to an operator-chosen window.
// The operator is reached through `WindowPrompt`, so the validation loop runs the same
// against a console, a fixed window from the command line, or scripted answers in tests.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::error::Result;
use crate::table::SampleTable;

const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Why an answer was refused; the prompt is asked again afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Format(String),
    StartBeforeData,
    EndAfterData,
    StartAfterEnd,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Format(input) => {
                write!(f, "{:?} is not a time of day (expected HH:MM:SS)", input)
            }
            Rejection::StartBeforeData => f.write_str("starting time is before the first sample"),
            Rejection::EndAfterData => f.write_str("ending time is after the last sample"),
            Rejection::StartAfterEnd => f.write_str("ending time is prior to starting time"),
        }
    }
}

pub trait WindowPrompt {
    /// Shows the available range and returns one `(start, end)` answer, both `HH:MM:SS`.
    fn ask(&mut self, first: NaiveDateTime, last: NaiveDateTime) -> io::Result<(String, String)>;

    /// Reports why the previous answer was refused.
    fn reject(&mut self, reason: &Rejection);
}

/// Anything with a time axis that can be cut down to a window.
pub trait Partitionable {
    fn time_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)>;

    /// Keeps rows strictly between `start` and `end`.
    fn retain_between(&mut self, start: NaiveDateTime, end: NaiveDateTime);
}

impl Partitionable for SampleTable {
    fn time_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.first_time()?, self.last_time()?))
    }

    fn retain_between(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        SampleTable::retain_between(self, start, end);
    }
}

/// Asks until the prompt yields a window inside `[first, last]` with start <= end.
/// Start times take the date of `first`, end times the date of `last`.
pub fn choose_window(
    prompt: &mut dyn WindowPrompt,
    first: NaiveDateTime,
    last: NaiveDateTime,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    loop {
        let (raw_start, raw_end) = prompt.ask(first, last)?;
        let (start, end) = match (
            on_date(first.date(), &raw_start),
            on_date(last.date(), &raw_end),
        ) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(rejection), _) | (_, Err(rejection)) => {
                prompt.reject(&rejection);
                continue;
            }
        };

        let rejection = if start < first {
            Rejection::StartBeforeData
        } else if end > last {
            Rejection::EndAfterData
        } else if start > end {
            Rejection::StartAfterEnd
        } else {
            return Ok((start, end));
        };
        prompt.reject(&rejection);
    }
}

/// Narrows `table` to the window the prompt settles on. Empty tables pass through.
pub fn partition<T: Partitionable>(mut table: T, prompt: &mut dyn WindowPrompt) -> Result<T> {
    let Some((first, last)) = table.time_bounds() else {
        return Ok(table);
    };
    let (start, end) = choose_window(prompt, first, last)?;
    table.retain_between(start, end);
    info!(%start, %end, "time window applied");
    Ok(table)
}

/// Reborrows an optional prompt for one more call without giving it up.
pub fn reborrow<'a>(
    window: &'a mut Option<&mut dyn WindowPrompt>,
) -> Option<&'a mut dyn WindowPrompt> {
    match window {
        Some(prompt) => Some(&mut **prompt),
        None => None,
    }
}

fn on_date(date: NaiveDate, input: &str) -> std::result::Result<NaiveDateTime, Rejection> {
    NaiveTime::parse_from_str(input.trim(), TIME_OF_DAY_FORMAT)
        .map(|time| date.and_time(time))
        .map_err(|_| Rejection::Format(input.trim().to_string()))
}

/// Reads answers line by line and writes instructions to `output`.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "    {} >> ", question)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a time window was chosen",
            ));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> WindowPrompt for ConsolePrompt<R, W> {
    fn ask(&mut self, first: NaiveDateTime, last: NaiveDateTime) -> io::Result<(String, String)> {
        writeln!(self.output)?;
        writeln!(self.output, "Start observation date time: {}", first)?;
        writeln!(self.output, "End observation date time: {}", last)?;
        writeln!(
            self.output,
            "Observation interval request (format: HH:MM:SS, e.g. 00:00:00)"
        )?;
        let start = self.read_answer("Select a new starting observation time")?;
        let end = self.read_answer("Select a new ending observation time")?;
        Ok((start, end))
    }

    fn reject(&mut self, reason: &Rejection) {
        if writeln!(self.output, "{}. Try again.", reason).is_err() {
            warn!(%reason, "time window rejected");
        }
    }
}

/// One window given up front (e.g. on the command line), reused for every table.
/// A rejected fixed window cannot be corrected, so the next ask fails.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    start: String,
    end: String,
    rejected: Option<Rejection>,
}

impl FixedWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            rejected: None,
        }
    }
}

impl WindowPrompt for FixedWindow {
    fn ask(&mut self, _first: NaiveDateTime, _last: NaiveDateTime) -> io::Result<(String, String)> {
        if let Some(reason) = self.rejected.take() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("window {}..{} rejected: {}", self.start, self.end, reason),
            ));
        }
        Ok((self.start.clone(), self.end.clone()))
    }

    fn reject(&mut self, reason: &Rejection) {
        warn!(start = %self.start, end = %self.end, %reason, "time window rejected");
        self.rejected = Some(reason.clone());
    }
}

/// Replays queued answers and records every rejection.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<(String, String)>,
    rejections: Vec<Rejection>,
}

impl ScriptedPrompt {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = (S, S)>) -> Self {
        Self {
            answers: answers
                .into_iter()
                .map(|(s, e)| (s.into(), e.into()))
                .collect(),
            rejections: Vec::new(),
        }
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }
}

impl WindowPrompt for ScriptedPrompt {
    fn ask(&mut self, _first: NaiveDateTime, _last: NaiveDateTime) -> io::Result<(String, String)> {
        self.answers.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answers left")
        })
    }

    fn reject(&mut self, reason: &Rejection) {
        self.rejections.push(reason.clone());
    }
}
