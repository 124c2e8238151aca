use std::io::{self, Write};

use serde_json::Value;

use crate::error::HandleError;

use super::protocol::{Frame, ProgressUpdate};

/// Write end of the progress channel, handed to a running handle.
///
/// Each frame is written as one line and flushed immediately so the
/// supervisor sees updates in emission order as they happen.
pub struct ProgressSink {
    out: Box<dyn Write + Send>,
    sent: u64,
}

impl ProgressSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            sent: 0,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn send(&mut self, update: ProgressUpdate) -> Result<(), HandleError> {
        self.write_frame(&Frame::Update {
            values: update.into_values(),
        })?;
        Ok(())
    }

    /// Report progress only, 0–100.
    pub fn progress(&mut self, progress: u8) -> Result<(), HandleError> {
        self.send(ProgressUpdate::new().with_progress(progress))
    }

    /// Report a single metric value.
    pub fn report(&mut self, metric: &str, value: impl Into<Value>) -> Result<(), HandleError> {
        self.send(ProgressUpdate::new().metric(metric, value))
    }

    pub(crate) fn error(&mut self, message: &str) -> io::Result<()> {
        self.write_frame(&Frame::Error {
            message: message.to_string(),
        })
    }

    /// Number of frames written so far.
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let line = frame.to_line()?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        self.sent += 1;
        Ok(())
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory writer whose contents stay readable after the sink owns it.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub(crate) Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frames_are_line_delimited_json() {
        let buf = SharedBuf::default();
        let mut sink = ProgressSink::new(buf.clone());

        sink.progress(10).unwrap();
        sink.report("loss", 0.25).unwrap();
        sink.send(ProgressUpdate::new().with_progress(20).metric("step", 2)).unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(sink.frames_sent(), 3);
        assert_eq!(lines[0], r#"{"kind":"update","values":{"progress":10}}"#);
        assert_eq!(lines[1], r#"{"kind":"update","values":{"loss":0.25}}"#);
        assert_eq!(
            Frame::parse(&lines[2]),
            Some(Frame::Update {
                values: [
                    ("progress".to_string(), Value::from(20)),
                    ("step".to_string(), Value::from(2)),
                ]
                .into_iter()
                .collect()
            })
        );
    }
}
