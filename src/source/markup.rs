use super::{Origin, Pull};
use crate::error::{CopipeError, CopipeResult};
use crate::pipeline::MarkupEvent;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Streaming XML origin yielding start, text and end events
///
/// Self-closing elements produce a start followed by an end. Text and attribute values
/// are unescaped, CDATA sections are reported as text, and comments, declarations and
/// processing instructions are skipped.
pub struct MarkupOrigin<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    queued: VecDeque<MarkupEvent>,
    finished: bool,
    label: String,
}

impl<R: BufRead> MarkupOrigin<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            queued: VecDeque::new(),
            finished: false,
            label: "markup reader".to_string(),
        }
    }

    /// Parse until at least one event is queued or the document ends
    fn read_more(&mut self) -> CopipeResult<()> {
        while self.queued.is_empty() && !self.finished {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).map_err(|e| {
                CopipeError::Markup(format!(
                    "{} at byte {}",
                    e,
                    self.reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(start) => {
                    let start = start_event(&start)?;
                    self.queued.push_back(start);
                }
                Event::Empty(start) => {
                    let name = element_name(start.name().as_ref());
                    let start = start_event(&start)?;
                    self.queued.push_back(start);
                    self.queued.push_back(MarkupEvent::End { name });
                }
                Event::End(end) => {
                    let name = element_name(end.name().as_ref());
                    self.queued.push_back(MarkupEvent::End { name });
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    self.queued.push_back(MarkupEvent::Text(text));
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    self.queued.push_back(MarkupEvent::Text(text));
                }
                Event::Eof => self.finished = true,
                _ => {}
            }
        }
        Ok(())
    }
}

impl MarkupOrigin<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> CopipeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let mut origin = Self::new(BufReader::new(file));
        origin.label = path.display().to_string();
        Ok(origin)
    }
}

impl<R: BufRead> Origin<MarkupEvent> for MarkupOrigin<R> {
    fn pull(&mut self) -> CopipeResult<Pull<MarkupEvent>> {
        self.read_more()?;
        Ok(match self.queued.pop_front() {
            Some(event) => Pull::Item(event),
            None => Pull::Exhausted,
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn start_event(start: &BytesStart<'_>) -> CopipeResult<MarkupEvent> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| CopipeError::Markup(e.to_string()))?;
        let key = element_name(attr.key.as_ref());
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(MarkupEvent::Start {
        name: element_name(start.name().as_ref()),
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn events(xml: &str) -> Vec<MarkupEvent> {
        let mut origin = MarkupOrigin::new(Cursor::new(xml.as_bytes().to_vec()));
        let mut events = Vec::new();
        while let Pull::Item(event) = origin.pull().unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_reports_start_text_end() {
        let events = events(r#"<bus id="7574"><route>22</route></bus>"#);

        assert_eq!(
            events,
            vec![
                MarkupEvent::Start {
                    name: "bus".to_string(),
                    attributes: vec![("id".to_string(), "7574".to_string())],
                },
                MarkupEvent::start("route"),
                MarkupEvent::text("22"),
                MarkupEvent::end("route"),
                MarkupEvent::end("bus"),
            ]
        );
    }

    #[test]
    fn test_empty_element_expands() {
        let events = events("<bus><note/></bus>");
        assert_eq!(
            events,
            vec![
                MarkupEvent::start("bus"),
                MarkupEvent::start("note"),
                MarkupEvent::end("note"),
                MarkupEvent::end("bus"),
            ]
        );
    }

    #[test]
    fn test_text_is_unescaped_and_cdata_kept() {
        let events = events("<d>North &amp; South<![CDATA[<raw>]]></d>");
        assert_eq!(
            events,
            vec![
                MarkupEvent::start("d"),
                MarkupEvent::text("North & South"),
                MarkupEvent::text("<raw>"),
                MarkupEvent::end("d"),
            ]
        );
    }

    #[test]
    fn test_declaration_and_comments_skipped() {
        let events = events("<?xml version=\"1.0\"?><!-- buses --><buses></buses>");
        assert_eq!(
            events,
            vec![MarkupEvent::start("buses"), MarkupEvent::end("buses")]
        );
    }

    #[test]
    fn test_mismatched_end_is_an_error() {
        let mut origin = MarkupOrigin::new(Cursor::new(b"<bus></route>".to_vec()));
        assert_eq!(origin.pull().unwrap(), Pull::Item(MarkupEvent::start("bus")));

        let err = origin.pull().unwrap_err();
        assert!(matches!(err, CopipeError::Markup(_)));
    }
}
