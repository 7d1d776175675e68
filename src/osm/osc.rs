// ABOUTME: OSM change file (osmChange XML) encoding with bounded in-memory buffers
// ABOUTME: Writes gzip-compressed .osc.gz output that is fsynced on close

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{format_coordinate, ObjectMeta, OsmObject, Tag};
use crate::durable::sync_dir;
use crate::error::{Error, Result};

/// The osmChange block an object version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Modify,
    Delete,
}

impl Action {
    pub fn for_object(meta: &ObjectMeta) -> Self {
        if !meta.visible {
            Action::Delete
        } else if meta.version == 1 {
            Action::Create
        } else {
            Action::Modify
        }
    }

    pub fn element(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Modify => "modify",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub generator: String,
}

impl Header {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
        }
    }
}

/// Serialized object records waiting to be written.
///
/// The buffer only counts bytes; when to flush is up to the caller.
#[derive(Debug, Default)]
pub struct ChangeBuffer {
    records: Vec<(Action, String)>,
    committed: usize,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize one object and commit it to the buffer.
    pub fn push(&mut self, object: &OsmObject) {
        let record = encode_object(object);
        self.committed += record.len();
        self.records.push((Action::for_object(object.meta()), record));
    }

    /// Bytes committed so far.
    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Streams buffers into an osmChange document. Consecutive records with
/// the same action share one `<create>`/`<modify>`/`<delete>` block, also
/// across buffers.
pub struct OscWriter<W: Write> {
    out: W,
    open: Option<Action>,
}

impl<W: Write> OscWriter<W> {
    pub fn new(mut out: W, header: &Header) -> io::Result<Self> {
        let mut prolog = String::from("<?xml version='1.0' encoding='UTF-8'?>\n");
        prolog.push_str("<osmChange version=\"0.6\" generator=\"");
        escape_into(&mut prolog, &header.generator);
        prolog.push_str("\">\n");
        out.write_all(prolog.as_bytes())?;
        Ok(Self { out, open: None })
    }

    pub fn write_buffer(&mut self, buffer: ChangeBuffer) -> io::Result<()> {
        for (action, record) in buffer.records {
            if self.open != Some(action) {
                if let Some(previous) = self.open {
                    writeln!(self.out, "</{}>", previous.element())?;
                }
                writeln!(self.out, "<{}>", action.element())?;
                self.open = Some(action);
            }
            self.out.write_all(record.as_bytes())?;
        }
        Ok(())
    }

    /// Close the open block and the document, handing back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(action) = self.open.take() {
            writeln!(self.out, "</{}>", action.element())?;
        }
        self.out.write_all(b"</osmChange>\n")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// A `.osc.gz` file on disk.
///
/// The file is created exclusively; an existing file is never overwritten.
/// [`OscFile::close`] finishes the stream and syncs the file and its
/// directory. A file dropped without being closed is removed again so a
/// failed run never leaves a truncated diff behind.
pub struct OscFile {
    path: PathBuf,
    writer: Option<OscWriter<GzEncoder<File>>>,
}

impl OscFile {
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::io(format!("Creating '{}' failed", path.display()), e))?;

        let mut osc = Self {
            path: path.to_path_buf(),
            writer: None,
        };
        match OscWriter::new(GzEncoder::new(file, Compression::default()), header) {
            Ok(writer) => {
                osc.writer = Some(writer);
                Ok(osc)
            }
            Err(e) => {
                let err = osc.write_error(e);
                osc.remove_partial();
                Err(err)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_buffer(&mut self, buffer: ChangeBuffer) -> Result<()> {
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_buffer(buffer),
            None => Ok(()),
        };
        result.map_err(|e| self.write_error(e))
    }

    pub fn close(mut self) -> Result<PathBuf> {
        let Some(writer) = self.writer.take() else {
            return Ok(self.path.clone());
        };
        let result = writer.finish().and_then(|gz| gz.finish()).and_then(|file| {
            file.sync_all()?;
            Ok(file)
        });
        if let Err(e) = result {
            let err = self.write_error(e);
            self.remove_partial();
            return Err(err);
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        sync_dir(dir)?;
        Ok(self.path.clone())
    }

    fn write_error(&self, e: io::Error) -> Error {
        Error::io(format!("Writing '{}' failed", self.path.display()), e)
    }

    fn remove_partial(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove partial diff {:?}: {}", self.path, e);
        }
    }
}

impl Drop for OscFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            self.remove_partial();
        }
    }
}

fn encode_object(object: &OsmObject) -> String {
    let meta = object.meta();
    let name = object.object_type().name();
    let mut out = String::with_capacity(128);

    let _ = write!(
        out,
        "  <{} id=\"{}\" version=\"{}\" timestamp=\"",
        name, meta.id, meta.version
    );
    escape_into(&mut out, &meta.timestamp);
    let _ = write!(out, "\" uid=\"{}\" user=\"", meta.user.id);
    escape_into(&mut out, &meta.user.username);
    let _ = write!(out, "\" changeset=\"{}\"", meta.changeset);

    if let OsmObject::Node(node) = object {
        if meta.visible {
            let _ = write!(
                out,
                " lat=\"{}\" lon=\"{}\"",
                format_coordinate(node.location.lat),
                format_coordinate(node.location.lon)
            );
        }
    }

    let mut children = String::new();
    match object {
        OsmObject::Node(_) => {}
        OsmObject::Way(way) => {
            for node_ref in &way.nodes {
                let _ = writeln!(children, "    <nd ref=\"{}\"/>", node_ref);
            }
        }
        OsmObject::Relation(relation) => {
            for member in &relation.members {
                let _ = write!(
                    children,
                    "    <member type=\"{}\" ref=\"{}\" role=\"",
                    member.member_type.name(),
                    member.member_id
                );
                escape_into(&mut children, &member.role);
                children.push_str("\"/>\n");
            }
        }
    }
    encode_tags(&mut children, object.tags());

    if children.is_empty() {
        out.push_str("/>\n");
    } else {
        out.push_str(">\n");
        out.push_str(&children);
        let _ = writeln!(out, "  </{}>", name);
    }
    out
}

fn encode_tags(out: &mut String, tags: &[Tag]) {
    for tag in tags {
        out.push_str("    <tag k=\"");
        escape_into(out, &tag.key);
        out.push_str("\" v=\"");
        escape_into(out, &tag.value);
        out.push_str("\"/>\n");
    }
}

fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push_str("&#x9;"),
            c => out.push(c),
        }
    }
}
