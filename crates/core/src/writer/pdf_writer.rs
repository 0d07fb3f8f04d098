//! Whole-document writer: header, pages, catalog and trailer around a
//! [`PdfBody`].

use super::body::{DEFAULT_FLATE_LEVEL, PdfBody};
use super::xref::{XrefFormat, write_xref_section};
use crate::codec::flate_encode;
use crate::content::ContentStream;
use crate::error::Result;
use crate::model::{ObjRef, PdfDictionary, PdfObject, PdfStream, PdfString};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// What gets compressed in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Everything is written as-is.
    #[default]
    None,
    /// Stream payloads are Flate-encoded.
    Streams,
    /// Streams, object streams and an xref stream (PDF 1.5).
    Full,
}

/// Output settings for [`PdfWriter`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub version: String,
    pub compression: Compression,
    pub flate_level: u32,
    /// Tagging mode of content streams created with [`PdfWriter::new_content`].
    pub tagged: bool,
    /// Fixed file identifier; random-ish when unset.
    pub file_id: Option<Vec<u8>>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: "1.4".to_string(),
            compression: Compression::None,
            flate_level: DEFAULT_FLATE_LEVEL,
            tagged: false,
            file_id: None,
        }
    }
}

impl WriterOptions {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_flate_level(mut self, level: u32) -> Self {
        self.flate_level = level.min(9);
        self
    }

    pub fn with_tagged(mut self, tagged: bool) -> Self {
        self.tagged = tagged;
        self
    }

    pub fn with_file_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.file_id = Some(id.into());
        self
    }

    /// Header version; object and xref streams need at least 1.5.
    pub fn effective_version(&self) -> String {
        let requested: f64 = self.version.parse().unwrap_or(0.0);
        if self.compression == Compression::Full && requested < 1.5 {
            "1.5".to_string()
        } else {
            self.version.clone()
        }
    }
}

/// Writes a new document from scratch.
///
/// ```no_run
/// # use vellum_core::writer::{PdfWriter, WriterOptions};
/// # use vellum_core::model::PdfDictionary;
/// # fn main() -> vellum_core::Result<()> {
/// let mut writer = PdfWriter::new(Vec::new(), WriterOptions::default())?;
/// let content = writer.new_content();
/// writer.add_page([0.0, 0.0, 612.0, 792.0], PdfDictionary::new(), content)?;
/// let bytes = writer.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PdfWriter<W: Write> {
    body: PdfBody<W>,
    options: WriterOptions,
    pages_root: ObjRef,
    pages: Vec<ObjRef>,
    info: Option<ObjRef>,
    root: Option<ObjRef>,
}

impl<W: Write> PdfWriter<W> {
    pub fn new(out: W, options: WriterOptions) -> Result<Self> {
        let object_streams = options.compression == Compression::Full;
        let mut body =
            PdfBody::new(out, 0, 1, object_streams).with_flate_level(options.flate_level);
        // Header, then a comment of high bytes marking the file as binary.
        write!(body.writer(), "%PDF-{}\n", options.effective_version())?;
        body.writer().write_all(b"%\xE2\xE3\xCF\xD3\n")?;
        let pages_root = body.reserve();
        Ok(Self {
            body,
            options,
            pages_root,
            pages: Vec::new(),
            info: None,
            root: None,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Empty content stream in this writer's tagging mode.
    pub fn new_content(&self) -> ContentStream {
        ContentStream::new(self.options.tagged)
    }

    /// Reference the generated `/Pages` node will be written under.
    pub fn pages_root(&self) -> ObjRef {
        self.pages_root
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn reserve(&mut self) -> ObjRef {
        self.body.reserve()
    }

    pub fn add(&mut self, obj: &PdfObject) -> Result<ObjRef> {
        self.body.add(obj)
    }

    pub fn add_at(&mut self, r: ObjRef, obj: &PdfObject) -> Result<()> {
        self.body.add_at(r, obj)
    }

    /// Add a stream from decoded `data`, Flate-encoding it when streams are
    /// compressed and `dict` names no filter of its own.
    pub fn add_stream(&mut self, dict: PdfDictionary, data: &[u8]) -> Result<ObjRef> {
        let stream = self.make_stream(dict, data)?;
        self.body.add(&stream.into())
    }

    fn make_stream(&self, mut dict: PdfDictionary, data: &[u8]) -> Result<PdfStream> {
        if self.options.compression != Compression::None && !dict.contains_key("Filter") {
            dict.insert("Filter", PdfObject::name("FlateDecode"));
            let encoded = flate_encode(data, self.options.flate_level)?;
            return Ok(PdfStream::new(dict, encoded));
        }
        Ok(PdfStream::new(dict, data.to_vec()))
    }

    /// Write `contents` and a page object under the flat page root.
    pub fn add_page(
        &mut self,
        media_box: [f64; 4],
        resources: PdfDictionary,
        mut contents: ContentStream,
    ) -> Result<ObjRef> {
        let data = contents.to_bytes()?;
        let contents_ref = self.add_stream(PdfDictionary::new(), &data)?;

        let mut page = PdfDictionary::with_type("Page");
        page.insert("Parent", self.pages_root);
        page.insert(
            "MediaBox",
            media_box.iter().map(|&v| PdfObject::from(v)).collect::<Vec<_>>(),
        );
        page.insert("Resources", resources);
        page.insert("Contents", contents_ref);
        let page_ref = self.body.add(&page.into())?;
        self.pages.push(page_ref);
        Ok(page_ref)
    }

    pub fn set_info(&mut self, info: PdfDictionary) -> Result<ObjRef> {
        let r = self.body.add(&info.into())?;
        self.info = Some(r);
        Ok(r)
    }

    /// Use a caller-written catalog instead of the generated one.
    pub fn set_root(&mut self, root: ObjRef) {
        self.root = Some(root);
    }

    fn file_id(&self) -> Vec<u8> {
        if let Some(id) = &self.options.file_id {
            return id.clone();
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut ctx = md5::Context::new();
        ctx.consume(nanos.to_le_bytes());
        ctx.consume(self.body.position().to_le_bytes());
        ctx.consume(self.body.size().to_le_bytes());
        ctx.finalize().0.to_vec()
    }

    /// Write the page tree, catalog, cross-reference section and trailer,
    /// then return the output.
    pub fn close(mut self) -> Result<W> {
        let mut pages = PdfDictionary::with_type("Pages");
        pages.insert(
            "Kids",
            self.pages
                .iter()
                .map(|&r| PdfObject::from(r))
                .collect::<Vec<_>>(),
        );
        pages.insert("Count", self.pages.len());
        self.body.add_at(self.pages_root, &pages.into())?;

        let root = match self.root {
            Some(r) => r,
            None => {
                let mut catalog = PdfDictionary::with_type("Catalog");
                catalog.insert("Pages", self.pages_root);
                self.body.add(&catalog.into())?
            }
        };

        let id = PdfObject::String(PdfString::hex(self.file_id()));
        let mut trailer = PdfDictionary::new();
        trailer.insert("Root", root);
        if let Some(info) = self.info {
            trailer.insert("Info", info);
        }
        trailer.insert("ID", vec![id.clone(), id]);

        let format = match self.options.compression {
            Compression::Full => XrefFormat::Stream,
            _ => XrefFormat::Table,
        };
        write_xref_section(&mut self.body, trailer, None, format)?;
        self.body.into_inner()
    }
}
