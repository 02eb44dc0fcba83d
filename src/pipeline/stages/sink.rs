use crate::error::CopipeResult;
use crate::logger::LogLevel;
use crate::pipe_log;
use crate::pipeline::{Coroutine, Record, Stage};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Terminal stage that writes one formatted line per item, flushed as it is written
pub struct Printer<T> {
    name: String,
    writer: Box<dyn Write>,
    format: Box<dyn Fn(&T) -> String>,
    written: u64,
}

impl<T> Printer<T> {
    pub fn new<W, F>(name: impl Into<String>, writer: W, format: F) -> Self
    where
        W: Write + 'static,
        F: Fn(&T) -> String + 'static,
    {
        Self {
            name: name.into(),
            writer: Box::new(writer),
            format: Box::new(format),
            written: 0,
        }
    }
}

impl Printer<String> {
    /// Print lines as they are, without doubling their newline
    pub fn lines<W: Write + 'static>(name: impl Into<String>, writer: W) -> Self {
        Printer::new(name, writer, |line: &String| {
            line.trim_end_matches(['\r', '\n']).to_string()
        })
    }
}

impl Printer<Record> {
    /// Print records through a `{field}` template
    pub fn records<W: Write + 'static>(
        name: impl Into<String>,
        writer: W,
        template: impl Into<String>,
    ) -> Self {
        let template = template.into();
        Printer::new(name, writer, move |record: &Record| record.render(&template))
    }
}

impl<T> Coroutine<T> for Printer<T> {
    fn resume(&mut self, item: T) -> CopipeResult<()> {
        let line = (self.format)(&item);
        writeln!(self.writer, "{}", line)?;
        // Lines must reach the file while a followed source is still running
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> CopipeResult<()> {
        self.writer.flush()?;
        pipe_log!(
            LogLevel::Debug,
            "pipeline::sink",
            "Printer '{}' wrote {} line(s)",
            self.name,
            self.written
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shared view of the items a [`Collector`] has received
pub struct Collected<T> {
    items: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Collected<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T: Clone> Collected<T> {
    /// Snapshot of everything received so far, in arrival order
    pub fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }
}

impl<T> Collected<T> {
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Remove and return everything received so far
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

/// Terminal stage that keeps every item in memory
pub struct Collector<T> {
    name: String,
    items: Rc<RefCell<Vec<T>>>,
}

impl<T: 'static> Collector<T> {
    /// Start a collector and return it with a handle to its contents
    pub fn start(name: impl Into<String>) -> CopipeResult<(Stage<T>, Collected<T>)> {
        let items = Rc::new(RefCell::new(Vec::new()));
        let stage = Stage::start(Collector {
            name: name.into(),
            items: Rc::clone(&items),
        })?;
        Ok((stage, Collected { items }))
    }
}

impl<T> Coroutine<T> for Collector<T> {
    fn resume(&mut self, item: T) -> CopipeResult<()> {
        self.items.borrow_mut().push(item);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Terminal stage that drops everything it receives
pub struct Discard {
    name: String,
}

impl Discard {
    pub fn start<T: 'static>(name: impl Into<String>) -> CopipeResult<Stage<T>> {
        Stage::start(Discard { name: name.into() })
    }
}

impl<T> Coroutine<T> for Discard {
    fn resume(&mut self, _item: T) -> CopipeResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer whose buffer stays readable after being moved into a printer
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_printer_keeps_single_newline() {
        let out = SharedBuffer::default();
        let printer = Stage::start(Printer::lines("printer", out.clone())).unwrap();

        printer.send("python line\n".to_string()).unwrap();
        printer.send("no newline".to_string()).unwrap();
        printer.close().unwrap();

        assert_eq!(out.contents(), "python line\nno newline\n");
    }

    #[test]
    fn test_line_printer_flushes_each_line() {
        let out = SharedBuffer::default();
        let buffered = std::io::BufWriter::new(out.clone());
        let printer = Stage::start(Printer::lines("printer", buffered)).unwrap();

        printer.send("alpha python line\n".to_string()).unwrap();
        assert_eq!(out.contents(), "alpha python line\n");

        printer.send("beta python line\n".to_string()).unwrap();
        assert_eq!(out.contents(), "alpha python line\nbeta python line\n");
        assert!(!printer.is_closed());
    }

    #[test]
    fn test_record_printer_uses_template() {
        let out = SharedBuffer::default();
        let printer =
            Stage::start(Printer::records("bus", out.clone(), "{route},{id}")).unwrap();

        let record: Record = [("route", "22"), ("id", "7574")].into_iter().collect();
        printer.send(record).unwrap();

        assert_eq!(out.contents(), "22,7574\n");
    }

    #[test]
    fn test_collector_take_drains() {
        let (stage, collected) = Collector::start("sink").unwrap();
        stage.send(1).unwrap();
        stage.send(2).unwrap();

        assert_eq!(collected.take(), vec![1, 2]);
        assert!(collected.is_empty());
    }

    #[test]
    fn test_discard_accepts_anything() {
        let stage = Discard::start::<String>("null").unwrap();
        stage.send("ignored".to_string()).unwrap();
        assert_eq!(stage.stats().received, 1);
    }
}
