//! Where samples come from.
//!
//! Delivery cadence is up to the source; the engine only needs samples in
//! timestamp order. Sources that cannot timestamp readings themselves stamp
//! them with the time since the source was opened.

use std::io::{BufRead, StdinLock};
use std::time::Instant;

use log::warn;

use crate::signal::Sample;
use crate::{Error, Result};

pub trait SampleSource {
    /// Next reading, or `Ok(None)` once the stream has ended.
    fn next_sample(&mut self) -> Result<Option<Sample>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_sample(&mut self) -> Result<Option<Sample>> {
        (**self).next_sample()
    }
}

/// Parse one text line.
///
/// Accepts `x y z` or `t_ms x y z`, separated by whitespace and/or commas.
/// Blank lines and `#` comments give `Ok(None)`. Lines without a timestamp
/// are stamped with `now_ms`.
pub fn parse_line(line: &str, now_ms: u64) -> Result<Option<Sample>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect();

    let (timestamp_ms, axes) = match fields.len() {
        3 => (now_ms, &fields[..]),
        4 => {
            let t = fields[0]
                .parse::<u64>()
                .map_err(|e| Error::Source(format!("bad timestamp {:?}: {}", fields[0], e)))?;
            (t, &fields[1..])
        }
        n => {
            return Err(Error::Source(format!(
                "expected 3 or 4 fields, got {}: {:?}",
                n, line
            )))
        }
    };

    let mut xyz = [0.0f32; 3];
    for (slot, field) in xyz.iter_mut().zip(axes) {
        *slot = field
            .parse::<f32>()
            .map_err(|e| Error::Source(format!("bad axis value {:?}: {}", field, e)))?;
        if !slot.is_finite() {
            return Err(Error::Source(format!("non-finite axis value {:?}", field)));
        }
    }

    Ok(Some(Sample::new(xyz[0], xyz[1], xyz[2], timestamp_ms)))
}

/// Samples read as text lines, one reading per line.
///
/// Malformed lines are logged and skipped so a noisy feed does not stop the
/// controller.
pub struct LineSource<R> {
    reader: R,
    opened: Instant,
    line: String,
    line_no: usize,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            opened: Instant::now(),
            line: String::new(),
            line_no: 0,
        }
    }
}

impl LineSource<StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock())
    }
}

impl<R: BufRead> SampleSource for LineSource<R> {
    fn next_sample(&mut self) -> Result<Option<Sample>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let now_ms = self.opened.elapsed().as_millis() as u64;
            match parse_line(&self.line, now_ms) {
                Ok(Some(sample)) => return Ok(Some(sample)),
                Ok(None) => continue,
                Err(e) => warn!("line {}: {}", self.line_no, e),
            }
        }
    }
}

/// Fixed, pre-recorded samples.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: std::vec::IntoIter<Sample>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into_iter(),
        }
    }

    /// Field straight along +z, so positive values read as north and
    /// negative ones as south.
    pub fn vertical(points: &[(f32, u64)]) -> Self {
        Self::new(
            points
                .iter()
                .map(|&(z, t)| Sample::new(0.0, 0.0, z, t))
                .collect(),
        )
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for ReplaySource {
    fn next_sample(&mut self) -> Result<Option<Sample>> {
        Ok(self.samples.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_both_layouts() {
        assert_eq!(
            parse_line("1.5 -2 300", 77).unwrap(),
            Some(Sample::new(1.5, -2.0, 300.0, 77))
        );
        assert_eq!(
            parse_line("1200, 0.0, 0.0, -450.5", 77).unwrap(),
            Some(Sample::new(0.0, 0.0, -450.5, 1200))
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("", 0).unwrap(), None);
        assert_eq!(parse_line("   \t", 0).unwrap(), None);
        assert_eq!(parse_line("# x y z", 0).unwrap(), None);
    }

    #[test]
    fn malformed_lines_are_source_errors() {
        assert!(matches!(parse_line("1 2", 0), Err(Error::Source(_))));
        assert!(matches!(parse_line("a b c", 0), Err(Error::Source(_))));
        assert!(matches!(parse_line("-5 1 2 3", 0), Err(Error::Source(_))));
        assert!(matches!(parse_line("1 2 NaN", 0), Err(Error::Source(_))));
    }

    #[test]
    fn line_source_skips_noise() {
        let input = "# recorded\n0 0 0 600\n\ngarbage\n250 0 0 250\n";
        let mut source = LineSource::new(Cursor::new(input));

        assert_eq!(source.next_sample().unwrap(), Some(Sample::new(0.0, 0.0, 600.0, 0)));
        assert_eq!(source.next_sample().unwrap(), Some(Sample::new(0.0, 0.0, 250.0, 250)));
        assert_eq!(source.next_sample().unwrap(), None);
        assert_eq!(source.next_sample().unwrap(), None);
    }

    #[test]
    fn replay_yields_in_order_then_ends() {
        let mut source = ReplaySource::vertical(&[(600.0, 0), (-600.0, 100)]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_sample().unwrap().unwrap().z, 600.0);
        assert_eq!(source.next_sample().unwrap().unwrap().timestamp_ms, 100);
        assert!(source.next_sample().unwrap().is_none());
    }

    #[test]
    fn boxed_sources_work() {
        let mut source: Box<dyn SampleSource> = Box::new(ReplaySource::vertical(&[(1.0, 5)]));
        assert!(source.next_sample().unwrap().is_some());
    }
}
