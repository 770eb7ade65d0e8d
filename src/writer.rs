use crate::error::Result;
use crate::objects::{Object, ObjectId};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output sink for flushed objects. The sink owns the final byte layout; the
/// flush manager only guarantees that objects arrive in ascending address
/// order per flush and that each address is written at most once.
pub trait ObjectSink {
    fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<()>;

    /// Writes whatever end-of-file structure the sink format requires
    /// (cross-reference table, trailer) and flushes the underlying stream.
    fn finish(&mut self, root: Option<ObjectId>, info: Option<ObjectId>) -> Result<()>;
}

/// Serializing [`ObjectSink`] producing a classic PDF body: header, indirect
/// objects, xref table, trailer.
pub struct PdfWriter<W: Write> {
    writer: W,
    xref_positions: HashMap<u32, (u16, u64)>,
    current_position: u64,
    header_written: bool,
}

impl PdfWriter<BufWriter<File>> {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new_with_writer(BufWriter::new(file)))
    }
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            xref_positions: HashMap::new(),
            current_position: 0,
            header_written: false,
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        self.write_bytes(b"%PDF-1.7\n")?;
        // Binary comment so transports treat the file as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        Ok(())
    }

    fn write_object_value(&mut self, object: &Object) -> Result<()> {
        match object {
            Object::Null => self.write_bytes(b"null")?,
            Object::Boolean(b) => self.write_bytes(if *b { b"true" } else { b"false" })?,
            Object::Integer(i) => self.write_bytes(i.to_string().as_bytes())?,
            Object::Real(f) => self.write_bytes(
                format!("{f:.6}")
                    .trim_end_matches('0')
                    .trim_end_matches('.')
                    .as_bytes(),
            )?,
            Object::String(s) => {
                self.write_bytes(b"(")?;
                for &byte in s.as_bytes() {
                    match byte {
                        b'(' | b')' | b'\\' => self.write_bytes(&[b'\\', byte])?,
                        _ => self.write_bytes(&[byte])?,
                    }
                }
                self.write_bytes(b")")?;
            }
            Object::Name(n) => {
                self.write_bytes(b"/")?;
                self.write_bytes(n.as_bytes())?;
            }
            Object::Array(arr) => {
                self.write_bytes(b"[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        self.write_bytes(b" ")?;
                    }
                    self.write_object_value(item)?;
                }
                self.write_bytes(b"]")?;
            }
            Object::Dictionary(dict) => {
                self.write_bytes(b"<<")?;
                for (key, value) in dict.iter() {
                    self.write_bytes(b"\n/")?;
                    self.write_bytes(key.as_bytes())?;
                    self.write_bytes(b" ")?;
                    self.write_object_value(value)?;
                }
                self.write_bytes(b"\n>>")?;
            }
            Object::Stream(dict, data) => {
                self.write_object_value(&Object::Dictionary(dict.clone()))?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(data)?;
                self.write_bytes(b"\nendstream")?;
            }
            Object::Reference(id) => {
                let reference = format!("{} {} R", id.number(), id.generation());
                self.write_bytes(reference.as_bytes())?;
            }
        }
        Ok(())
    }

    fn write_xref(&mut self) -> Result<u64> {
        let xref_position = self.current_position;
        let size = self
            .xref_positions
            .keys()
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);

        self.write_bytes(format!("xref\n0 {size}\n").as_bytes())?;
        // Object 0 heads the free list
        self.write_bytes(b"0000000000 65535 f \n")?;
        for number in 1..size {
            match self.xref_positions.get(&number).copied() {
                Some((generation, position)) => {
                    self.write_bytes(format!("{position:010} {generation:05} n \n").as_bytes())?;
                }
                None => self.write_bytes(b"0000000000 00000 f \n")?,
            }
        }
        Ok(xref_position)
    }
}

impl<W: Write> ObjectSink for PdfWriter<W> {
    fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        self.ensure_header()?;
        self.xref_positions
            .insert(id.number(), (id.generation(), self.current_position));

        let header = format!("{} {} obj\n", id.number(), id.generation());
        self.write_bytes(header.as_bytes())?;
        self.write_object_value(object)?;
        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    fn finish(&mut self, root: Option<ObjectId>, info: Option<ObjectId>) -> Result<()> {
        self.ensure_header()?;
        let size = self
            .xref_positions
            .keys()
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);
        let xref_position = self.write_xref()?;

        self.write_bytes(b"trailer\n<<")?;
        self.write_bytes(format!("\n/Size {size}").as_bytes())?;
        if let Some(root) = root {
            self.write_bytes(
                format!("\n/Root {} {} R", root.number(), root.generation()).as_bytes(),
            )?;
        }
        if let Some(info) = info {
            self.write_bytes(
                format!("\n/Info {} {} R", info.number(), info.generation()).as_bytes(),
            )?;
        }
        self.write_bytes(b"\n>>\n")?;
        self.write_bytes(format!("startxref\n{xref_position}\n%%EOF\n").as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
