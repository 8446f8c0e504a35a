use std::io::BufRead;
use std::ops::Deref;
use std::str;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::data::osm::{ElementKind, RawElement, RawTag};
use crate::errors::{Error, Result};

/// Pulls top-level elements of the requested kinds out of an .osm document, one at a time.
///
/// Only one element is materialized at any moment. [`ElementStream::next_element`] hands it
/// out behind an [`ElementGuard`] that borrows the stream, so the caller has to let go of the
/// element (drop the guard) before the next one can be requested; dropping the guard clears it.
/// The stream cannot be rewound, re-open the source to traverse again.
pub struct ElementStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    kinds: Vec<ElementKind>,
    current: RawElement,
    seen_root: bool,
    finished: bool,
    elements_read: u64,
}

impl<R: BufRead> ElementStream<R> {
    pub fn new(source: R, kinds: &[ElementKind]) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);

        ElementStream {
            reader,
            buf: Vec::new(),
            kinds: kinds.to_vec(),
            current: RawElement::new(ElementKind::Node),
            seen_root: false,
            finished: false,
            elements_read: 0,
        }
    }

    pub fn elements_read(&self) -> u64 {
        self.elements_read
    }

    fn release(&mut self) {
        self.current.clear();
    }

    /// Returns the next wanted element, or `None` once the document is exhausted.
    pub fn next_element(&mut self) -> Result<Option<ElementGuard<'_, R>>> {
        if self.finished {
            return Ok(None);
        }

        // Nesting below the open element; `None` while between elements.
        let mut depth: Option<usize> = None;
        let mut complete = false;

        while !complete {
            let position = self.reader.buffer_position();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Eof => {
                    self.finished = true;
                    if depth.is_some() {
                        return Err(Error::parse(
                            position,
                            format!(
                                "document ended inside {} {}",
                                self.current.kind,
                                self.current.id().unwrap_or("without id")
                            ),
                        ));
                    }
                    if !self.seen_root {
                        return Err(Error::parse(position, "document contains no elements"));
                    }
                    return Ok(None);
                }
                Event::Start(e) => {
                    self.seen_root = true;
                    match depth {
                        None => {
                            if let Some(kind) = ElementKind::from_tag_name(e.name().as_ref())
                                .filter(|kind| self.kinds.contains(kind))
                            {
                                begin(&mut self.current, kind, &e)?;
                                depth = Some(0);
                            }
                        }
                        Some(0) => {
                            read_child(&mut self.current, &e, position)?;
                            depth = Some(1);
                        }
                        Some(level) => depth = Some(level + 1),
                    }
                }
                Event::Empty(e) => {
                    self.seen_root = true;
                    match depth {
                        None => {
                            if let Some(kind) = ElementKind::from_tag_name(e.name().as_ref())
                                .filter(|kind| self.kinds.contains(kind))
                            {
                                begin(&mut self.current, kind, &e)?;
                                complete = true;
                            }
                        }
                        Some(0) => read_child(&mut self.current, &e, position)?,
                        Some(_) => (),
                    }
                }
                Event::End(_) => match depth {
                    Some(0) => complete = true,
                    Some(level) => depth = Some(level - 1),
                    None => (),
                },
                // Declarations, text, comments and the like carry nothing we shape.
                _ => (),
            }
            // if we don't keep a borrow elsewhere, we can clear the buffer to keep memory usage low
            self.buf.clear();
        }

        self.elements_read += 1;
        Ok(Some(ElementGuard { stream: self }))
    }
}

fn begin(element: &mut RawElement, kind: ElementKind, start: &BytesStart) -> Result<()> {
    element.kind = kind;
    for attribute_res in start.attributes() {
        let attribute = attribute_res?;
        let key = str::from_utf8(attribute.key.as_ref())?.to_string();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(())
}

fn read_child(element: &mut RawElement, child: &BytesStart, position: usize) -> Result<()> {
    match child.name().as_ref() {
        b"tag" => {
            let mut key: Option<String> = None;
            let mut value: Option<String> = None;
            for attribute_res in child.attributes() {
                let attribute = attribute_res?;
                match attribute.key.as_ref() {
                    b"k" => key = Some(attribute.unescape_value()?.into_owned()),
                    b"v" => value = Some(attribute.unescape_value()?.into_owned()),
                    _ => (),
                }
            }
            match (key, value) {
                (Some(key), Some(value)) => element.tags.push(RawTag { key, value }),
                _ => {
                    debug!(element_id = element.id().unwrap_or(""); "Skipping tag without k/v pair");
                }
            }
        }
        b"nd" => {
            let mut node_ref: Option<String> = None;
            for attribute_res in child.attributes() {
                let attribute = attribute_res?;
                if attribute.key.as_ref() == b"ref" {
                    node_ref = Some(attribute.unescape_value()?.into_owned());
                }
            }
            match node_ref {
                Some(node_ref) => element.node_refs.push(node_ref),
                None => {
                    return Err(Error::parse(
                        position,
                        format!("nd without ref in way {}", element.id().unwrap_or("without id")),
                    ))
                }
            }
        }
        _ => (),
    }
    Ok(())
}

/// Loan of the current element. Dropping it releases the element.
pub struct ElementGuard<'a, R: BufRead> {
    stream: &'a mut ElementStream<R>,
}

impl<R: BufRead> Deref for ElementGuard<'_, R> {
    type Target = RawElement;

    fn deref(&self) -> &RawElement {
        &self.stream.current
    }
}

impl<R: BufRead> Drop for ElementGuard<'_, R> {
    fn drop(&mut self) {
        self.stream.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <bounds minlat="36.0" minlon="-115.3" maxlat="36.3" maxlon="-115.0"/>
  <node id="1" lat="36.1" lon="-115.1" user="a" uid="7" version="2" changeset="9" timestamp="2010-07-22T16:16:51Z"/>
  <node id="2" lat="36.2" lon="-115.2">
    <tag k="amenity" v="fast_food"/>
    <tag k="name" v="Shelly&apos;s"/>
  </node>
  <way id="10">
    <nd ref="1"/>
    <tag k="highway" v="residential"/>
    <nd ref="2"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>"#;

    fn collect(doc: &str, kinds: &[ElementKind]) -> Result<Vec<RawElement>> {
        let mut stream = ElementStream::new(doc.as_bytes(), kinds);
        let mut out = Vec::new();
        while let Some(element) = stream.next_element()? {
            out.push(element.clone());
        }
        Ok(out)
    }

    #[test]
    fn yields_wanted_elements_in_document_order() {
        let elements = collect(SAMPLE, &[ElementKind::Node, ElementKind::Way]).unwrap();
        let ids: Vec<&str> = elements.iter().map(|e| e.id().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
        assert_eq!(elements[0].attribute("user"), Some("a"));
        assert!(elements[0].tags.is_empty());
        assert_eq!(elements[1].tags[1].value, "Shelly's");
        assert_eq!(elements[2].node_refs, vec!["1", "2"]);
        assert_eq!(elements[2].tags.len(), 1);
    }

    #[test]
    fn relations_only_when_requested() {
        let elements = collect(SAMPLE, &[ElementKind::Relation]).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, ElementKind::Relation);
        assert_eq!(elements[0].tags[0].key, "type");
        assert!(elements[0].node_refs.is_empty());
    }

    #[test]
    fn skips_tags_missing_key_or_value() {
        let doc = r#"<osm><node id="1" lat="0" lon="0"><tag k="a"/><tag v="b"/><tag k="c" v="d"/></node></osm>"#;
        let elements = collect(doc, &[ElementKind::Node]).unwrap();
        assert_eq!(elements[0].tags, vec![RawTag { key: "c".into(), value: "d".into() }]);
    }

    #[test]
    fn nd_without_ref_is_a_parse_error() {
        let doc = r#"<osm><way id="1"><nd/></way></osm>"#;
        let err = collect(doc, &[ElementKind::Way]).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn truncated_document_is_a_parse_error() {
        let doc = r#"<osm><node id="1" lat="0" lon="0"><tag k="a" v="b"/>"#;
        let err = collect(doc, &[ElementKind::Node]).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn mismatched_end_tag_is_a_parse_error() {
        let doc = r#"<osm><node id="1" lat="0" lon="0"></way></osm>"#;
        assert!(collect(doc, &[ElementKind::Node]).unwrap_err().is_parse_error());
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        assert!(collect("", &[ElementKind::Node]).unwrap_err().is_parse_error());
    }

    #[test]
    fn element_is_released_when_guard_drops() {
        let mut stream = ElementStream::new(SAMPLE.as_bytes(), &[ElementKind::Node, ElementKind::Way]);
        {
            let element = stream.next_element().unwrap().unwrap();
            assert_eq!(element.id(), Some("1"));
        }
        assert!(stream.current.attributes.is_empty());
        {
            let element = stream.next_element().unwrap().unwrap();
            assert_eq!(element.tags.len(), 2);
        }
        assert!(stream.current.tags.is_empty());
        assert!(stream.next_element().unwrap().is_some());
        assert!(stream.next_element().unwrap().is_none());
        assert!(stream.next_element().unwrap().is_none());
        assert_eq!(stream.elements_read(), 3);
    }

    #[test]
    fn memory_stays_bounded_on_large_documents() {
        let mut doc = String::from("<osm>\n");
        for id in 0..20_000 {
            doc.push_str(&format!(
                "<way id=\"{id}\"><nd ref=\"{id}\"/><tag k=\"addr:street\" v=\"Main St\"/><nd ref=\"{}\"/></way>\n",
                id + 1
            ));
        }
        doc.push_str("</osm>");

        let mut stream = ElementStream::new(doc.as_bytes(), &[ElementKind::Way]);
        let mut count = 0;
        let mut largest_element = 0;
        while let Some(element) = stream.next_element().unwrap() {
            largest_element = largest_element.max(element.node_refs.len() + element.tags.len());
            count += 1;
        }
        assert_eq!(count, 20_000);
        assert_eq!(largest_element, 3);
        assert!(stream.buf.capacity() < 4096);
        assert!(stream.current.attributes.capacity() < 16);
    }
}
