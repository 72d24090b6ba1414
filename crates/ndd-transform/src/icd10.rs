//! Flatten the CDC ICD-10-CM tabular XML into `code,description` rows.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use ndd_ingest::sibling_path;
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use tracing::info;

use crate::error::{Result, TransformError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnosis {
    /// Text of the first `name` child.
    pub name: Option<String>,
    /// Text of the first `desc` child.
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Name,
    Desc,
}

struct Capture {
    slot: usize,
    part: Part,
    depth: usize,
    text: String,
}

/// Every `diag` element in document order, nested ones included.
pub fn parse_diagnoses<R: BufRead>(source: R) -> Result<Vec<Diagnosis>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut diagnoses: Vec<Diagnosis> = Vec::new();
    // (slot, depth) of each open `diag`.
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut capture: Option<Capture> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"diag" => {
                        diagnoses.push(Diagnosis::default());
                        open.push((diagnoses.len() - 1, depth));
                    }
                    b"name" | b"desc" if capture.is_none() => {
                        let part = if e.local_name().as_ref() == b"name" {
                            Part::Name
                        } else {
                            Part::Desc
                        };
                        if let Some(&(slot, diag_depth)) = open.last() {
                            if depth == diag_depth + 1 {
                                capture = Some(Capture {
                                    slot,
                                    part,
                                    depth,
                                    text: String::new(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"diag" {
                    diagnoses.push(Diagnosis::default());
                }
            }
            Event::Text(t) => {
                if let Some(capture) = capture.as_mut().filter(|c| c.depth == depth) {
                    capture
                        .text
                        .push_str(&t.decode().map_err(quick_xml::Error::from)?);
                }
            }
            Event::CData(t) => {
                if let Some(capture) = capture.as_mut().filter(|c| c.depth == depth) {
                    capture
                        .text
                        .push_str(&t.decode().map_err(quick_xml::Error::from)?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some(capture) = capture.as_mut().filter(|c| c.depth == depth) {
                    if let Some(ch) = r.resolve_char_ref()? {
                        capture.text.push(ch);
                    } else {
                        let entity = r.decode().map_err(quick_xml::Error::from)?;
                        match resolve_predefined_entity(&entity) {
                            Some(resolved) => capture.text.push_str(resolved),
                            None => {
                                capture.text.push('&');
                                capture.text.push_str(&entity);
                                capture.text.push(';');
                            }
                        }
                    }
                }
            }
            Event::End(_) => {
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let Some(done) = capture.take() {
                        let target = &mut diagnoses[done.slot];
                        let slot = match done.part {
                            Part::Name => &mut target.name,
                            Part::Desc => &mut target.desc,
                        };
                        if slot.is_none() {
                            *slot = Some(done.text);
                        }
                    }
                }
                if open.last().is_some_and(|&(_, d)| d == depth) {
                    open.pop();
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(diagnoses)
}

/// Parse `xml_path` and write `<stem>_parsed.csv` beside it, without a header.
pub fn run(xml_path: &Path) -> Result<(PathBuf, usize)> {
    let file = File::open(xml_path).map_err(|source| TransformError::Io {
        path: xml_path.to_path_buf(),
        source,
    })?;
    let diagnoses = parse_diagnoses(BufReader::new(file))?;

    let output = sibling_path(xml_path, "_parsed", "csv");
    let csv_error = |source| TransformError::Csv {
        path: output.clone(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(&output)
        .map_err(csv_error)?;
    for diagnosis in &diagnoses {
        writer
            .write_record([
                diagnosis.name.as_deref().unwrap_or(""),
                diagnosis.desc.as_deref().unwrap_or(""),
            ])
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|source| TransformError::Io {
        path: output.clone(),
        source,
    })?;
    info!(output = %output.display(), diagnoses = diagnoses.len(), "ICD-10 codes written");
    Ok((output, diagnoses.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ICD10CM.tabular>
  <chapter>
    <name>6</name>
    <desc>Diseases of the nervous system (G00-G99)</desc>
    <section id="G40-G47">
      <diag>
        <name>G40</name>
        <desc>Epilepsy and recurrent seizures</desc>
        <inclusionTerm><note>epileptic convulsions</note></inclusionTerm>
        <diag>
          <name>G40.0</name>
          <desc>Localization-related (focal) (partial) idiopathic epilepsy &amp; syndromes</desc>
        </diag>
      </diag>
      <diag>
        <name>G41</name>
      </diag>
    </section>
  </chapter>
</ICD10CM.tabular>
"#;

    #[test]
    fn diagnoses_in_document_order() {
        let diagnoses = parse_diagnoses(SAMPLE.as_bytes()).unwrap();
        let names: Vec<_> = diagnoses.iter().map(|d| d.name.as_deref()).collect();
        assert_eq!(names, vec![Some("G40"), Some("G40.0"), Some("G41")]);
        assert_eq!(diagnoses[0].desc.as_deref(), Some("Epilepsy and recurrent seizures"));
        assert_eq!(
            diagnoses[1].desc.as_deref(),
            Some("Localization-related (focal) (partial) idiopathic epilepsy & syndromes")
        );
        assert_eq!(diagnoses[2].desc, None);
    }

    #[test]
    fn chapter_names_are_not_diagnoses() {
        let diagnoses = parse_diagnoses("<root><name>1</name></root>".as_bytes()).unwrap();
        assert!(diagnoses.is_empty());
    }
}
