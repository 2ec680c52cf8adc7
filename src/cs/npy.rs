//! NumPy `.npy` structured-array codec.
//!
//! cryoSPARC `.cs` files are `.npy` files holding a one-dimensional array of
//! fixed-width records. Records are kept as raw bytes together with a layout
//! describing every field, so that fields this crate never interprets are
//! written back bit-for-bit.
//!
//! ```text
//! \x93NUMPY <major> <minor> <header_len: u16 (v1) | u32 (v2, v3)> <header> <records>
//! ```
//!
//! The header length is chosen so that the record data starts on a 64-byte
//! boundary.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::header::{parse_literal, PyValue};
use crate::error::{Error, Result};

/// Magic string at the start of every `.npy` file
pub const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

const HEADER_ALIGNMENT: usize = 64;

fn align_up(n: usize) -> usize {
    (n + HEADER_ALIGNMENT - 1) / HEADER_ALIGNMENT * HEADER_ALIGNMENT
}

/// Read `n` bytes, growing the buffer only as data arrives
///
/// Lengths come from the file itself, so nothing is preallocated from them.
fn read_exactly<R: Read>(reader: &mut R, n: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(n as u64).read_to_end(&mut buf)?;
    if buf.len() != n {
        return Err(Error::InvalidFormat(format!(
            "{} truncated: expected {} bytes, found {}",
            what,
            n,
            buf.len()
        )));
    }
    Ok(buf)
}

/// Byte order of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// `<` (and `=` on the platforms cryoSPARC runs on)
    Little,
    /// `>`
    Big,
    /// `|`, single bytes and strings
    NotApplicable,
}

/// Element kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// `b`
    Bool,
    /// `i`
    Int,
    /// `u`
    UInt,
    /// `f`
    Float,
    /// `S`, NUL-padded bytes
    Bytes,
    /// `U`, NUL-padded UCS-4
    Unicode,
    /// `V`, opaque bytes
    Void,
}

/// One field of the record layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name, e.g. `blob/path`
    pub name: String,
    /// Type string as written in the header, e.g. `<f4`
    pub descr: String,
    /// Element kind
    pub kind: ScalarKind,
    /// Byte order of numeric elements
    pub endianness: Endianness,
    /// Bytes per element
    pub element_size: usize,
    /// Subarray shape; empty for scalar fields
    pub shape: Vec<usize>,
    /// Byte offset within a record
    pub offset: usize,
}

impl Field {
    /// Number of elements (1 for scalar fields)
    pub fn count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total bytes occupied in a record
    pub fn nbytes(&self) -> usize {
        self.element_size * self.count()
    }

    /// Whether the field holds numbers (or booleans)
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            ScalarKind::Bool | ScalarKind::Int | ScalarKind::UInt | ScalarKind::Float
        )
    }

    fn parse(name: &str, descr: &str, shape: Vec<usize>, offset: usize) -> Result<Self> {
        let invalid = || Error::InvalidFormat(format!("unsupported dtype {:?} for field {}", descr, name));

        let mut chars = descr.chars().peekable();
        let endianness = match chars.peek() {
            Some('<') | Some('=') => {
                chars.next();
                Endianness::Little
            }
            Some('>') => {
                chars.next();
                Endianness::Big
            }
            Some('|') => {
                chars.next();
                Endianness::NotApplicable
            }
            _ => Endianness::Little,
        };
        let kind = match chars.next() {
            Some('b') | Some('?') => ScalarKind::Bool,
            Some('i') => ScalarKind::Int,
            Some('u') => ScalarKind::UInt,
            Some('f') => ScalarKind::Float,
            Some('S') | Some('a') => ScalarKind::Bytes,
            Some('U') => ScalarKind::Unicode,
            Some('V') => ScalarKind::Void,
            _ => return Err(invalid()),
        };
        let digits: String = chars.collect();
        let width: usize = if digits.is_empty() && kind == ScalarKind::Bool {
            1
        } else {
            digits.parse().map_err(|_| invalid())?
        };

        let element_size = match kind {
            ScalarKind::Bool if width == 1 => 1,
            ScalarKind::Int | ScalarKind::UInt if matches!(width, 1 | 2 | 4 | 8) => width,
            ScalarKind::Float if matches!(width, 4 | 8) => width,
            ScalarKind::Bytes | ScalarKind::Void => width,
            ScalarKind::Unicode => width.checked_mul(4).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };

        Ok(Self {
            name: name.to_string(),
            descr: descr.to_string(),
            kind,
            endianness,
            element_size,
            shape,
            offset,
        })
    }

    /// Element `i` of this field within `record`, as a float
    fn element_f64(&self, record: &[u8], i: usize) -> Option<f64> {
        let start = self.offset + i * self.element_size;
        let b = &record[start..start + self.element_size];
        let big = self.endianness == Endianness::Big;
        macro_rules! read {
            ($f:ident) => {
                if big {
                    BigEndian::$f(b)
                } else {
                    LittleEndian::$f(b)
                }
            };
        }
        let value = match (self.kind, self.element_size) {
            (ScalarKind::Bool, 1) => f64::from(u8::from(b[0] != 0)),
            (ScalarKind::UInt, 1) => f64::from(b[0]),
            (ScalarKind::Int, 1) => f64::from(b[0] as i8),
            (ScalarKind::UInt, 2) => f64::from(read!(read_u16)),
            (ScalarKind::Int, 2) => f64::from(read!(read_i16)),
            (ScalarKind::UInt, 4) => f64::from(read!(read_u32)),
            (ScalarKind::Int, 4) => f64::from(read!(read_i32)),
            (ScalarKind::UInt, 8) => read!(read_u64) as f64,
            (ScalarKind::Int, 8) => read!(read_i64) as f64,
            (ScalarKind::Float, 4) => f64::from(read!(read_f32)),
            (ScalarKind::Float, 8) => read!(read_f64),
            _ => return None,
        };
        Some(value)
    }

    /// Element `i` as an unsigned integer; only for integer fields
    fn element_u64(&self, record: &[u8], i: usize) -> Option<u64> {
        let start = self.offset + i * self.element_size;
        let b = &record[start..start + self.element_size];
        let big = self.endianness == Endianness::Big;
        let signed = |v: i64| u64::try_from(v).ok();
        match (self.kind, self.element_size, big) {
            (ScalarKind::UInt, 1, _) => Some(u64::from(b[0])),
            (ScalarKind::Int, 1, _) => signed(i64::from(b[0] as i8)),
            (ScalarKind::UInt, 2, false) => Some(u64::from(LittleEndian::read_u16(b))),
            (ScalarKind::UInt, 2, true) => Some(u64::from(BigEndian::read_u16(b))),
            (ScalarKind::Int, 2, false) => signed(i64::from(LittleEndian::read_i16(b))),
            (ScalarKind::Int, 2, true) => signed(i64::from(BigEndian::read_i16(b))),
            (ScalarKind::UInt, 4, false) => Some(u64::from(LittleEndian::read_u32(b))),
            (ScalarKind::UInt, 4, true) => Some(u64::from(BigEndian::read_u32(b))),
            (ScalarKind::Int, 4, false) => signed(i64::from(LittleEndian::read_i32(b))),
            (ScalarKind::Int, 4, true) => signed(i64::from(BigEndian::read_i32(b))),
            (ScalarKind::UInt, 8, false) => Some(LittleEndian::read_u64(b)),
            (ScalarKind::UInt, 8, true) => Some(BigEndian::read_u64(b)),
            (ScalarKind::Int, 8, false) => signed(LittleEndian::read_i64(b)),
            (ScalarKind::Int, 8, true) => signed(BigEndian::read_i64(b)),
            _ => None,
        }
    }

    /// Element `i` as a signed integer; only for signed integer fields
    fn element_i64(&self, record: &[u8], i: usize) -> Option<i64> {
        let start = self.offset + i * self.element_size;
        let b = &record[start..start + self.element_size];
        let big = self.endianness == Endianness::Big;
        match (self.kind, self.element_size, big) {
            (ScalarKind::Int, 1, _) => Some(i64::from(b[0] as i8)),
            (ScalarKind::Int, 2, false) => Some(i64::from(LittleEndian::read_i16(b))),
            (ScalarKind::Int, 2, true) => Some(i64::from(BigEndian::read_i16(b))),
            (ScalarKind::Int, 4, false) => Some(i64::from(LittleEndian::read_i32(b))),
            (ScalarKind::Int, 4, true) => Some(i64::from(BigEndian::read_i32(b))),
            (ScalarKind::Int, 8, false) => Some(LittleEndian::read_i64(b)),
            (ScalarKind::Int, 8, true) => Some(BigEndian::read_i64(b)),
            _ => None,
        }
    }

    /// Element `i` rendered as text
    fn element_text(&self, record: &[u8], i: usize) -> String {
        let start = self.offset + i * self.element_size;
        let b = &record[start..start + self.element_size];
        match self.kind {
            ScalarKind::Bytes => {
                let end = b.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
                String::from_utf8_lossy(&b[..end]).into_owned()
            }
            ScalarKind::Unicode => b
                .chunks_exact(4)
                .map(|c| match self.endianness {
                    Endianness::Big => BigEndian::read_u32(c),
                    _ => LittleEndian::read_u32(c),
                })
                .take_while(|&c| c != 0)
                .filter_map(char::from_u32)
                .collect(),
            ScalarKind::Void => b.iter().map(|byte| format!("{:02x}", byte)).collect(),
            ScalarKind::Bool => (b[0] != 0).to_string(),
            ScalarKind::UInt => self.element_u64(record, i).map(|v| v.to_string()).unwrap_or_default(),
            ScalarKind::Int => self.element_i64(record, i).map(|v| v.to_string()).unwrap_or_default(),
            // Render single precision at its own precision, not widened
            ScalarKind::Float if self.element_size == 4 => self
                .element_f64(record, i)
                .map(|v| (v as f32).to_string())
                .unwrap_or_default(),
            ScalarKind::Float => self
                .element_f64(record, i)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }

    /// `('name', 'descr')` or `('name', 'descr', (d0, d1))`
    fn header_repr(&self) -> String {
        if self.shape.is_empty() {
            format!("('{}', '{}')", self.name, self.descr)
        } else {
            let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
            let dims = if dims.len() == 1 {
                format!("({},)", dims[0])
            } else {
                format!("({})", dims.join(", "))
            };
            format!("('{}', '{}', {})", self.name, self.descr, dims)
        }
    }
}

/// Ordered fields of a structured dtype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    fields: Vec<Field>,
    itemsize: usize,
}

impl RecordLayout {
    /// Build a packed layout from `(name, type string, subarray shape)` triples
    pub fn new<S: AsRef<str>>(fields: &[(S, S, Vec<usize>)]) -> Result<Self> {
        let mut offset = 0;
        let mut parsed = Vec::with_capacity(fields.len());
        for (name, descr, shape) in fields {
            let field = Field::parse(name.as_ref(), descr.as_ref(), shape.clone(), offset)?;
            offset = shape
                .iter()
                .try_fold(1usize, |count, &d| count.checked_mul(d))
                .and_then(|count| count.checked_mul(field.element_size))
                .and_then(|nbytes| offset.checked_add(nbytes))
                .ok_or_else(|| {
                    Error::InvalidFormat(format!("field {} does not fit in a record", field.name))
                })?;
            parsed.push(field);
        }
        Ok(Self {
            fields: parsed,
            itemsize: offset,
        })
    }

    fn from_descr(descr: &PyValue) -> Result<Self> {
        let entries = match descr {
            PyValue::List(entries) => entries,
            _ => {
                return Err(Error::InvalidFormat(
                    "npy descr is not a structured dtype".to_string(),
                ))
            }
        };

        let mut fields = Vec::with_capacity(entries.len());
        for entry in entries {
            let parts = entry
                .as_seq()
                .ok_or_else(|| Error::InvalidFormat("malformed descr entry".to_string()))?;
            let name = parts.first().and_then(PyValue::as_str);
            let ty = parts.get(1).and_then(PyValue::as_str);
            let (Some(name), Some(ty)) = (name, ty) else {
                return Err(Error::InvalidFormat(format!(
                    "unsupported descr entry {:?}",
                    entry
                )));
            };
            let shape = match parts.get(2) {
                Some(dims) => dims.as_dims().ok_or_else(|| {
                    Error::InvalidFormat(format!("malformed shape for field {}", name))
                })?,
                None => Vec::new(),
            };
            fields.push((name.to_string(), ty.to_string(), shape));
        }
        Self::new(&fields)
    }

    /// Fields in declared order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Bytes per record
    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn descr_repr(&self) -> String {
        let items: Vec<String> = self.fields.iter().map(Field::header_repr).collect();
        format!("[{}]", items.join(", "))
    }
}

/// One-dimensional array of fixed-width records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredArray {
    layout: Arc<RecordLayout>,
    data: Vec<u8>,
    len: usize,
}

impl StructuredArray {
    /// Array of `len` zero-filled records
    pub fn zeroed(layout: RecordLayout, len: usize) -> Self {
        let data = vec![0; layout.itemsize * len];
        Self {
            layout: Arc::new(layout),
            data,
            len,
        }
    }

    /// Read an `.npy` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read `.npy` content
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic)?;
        if &magic != NPY_MAGIC {
            return Err(Error::InvalidFormat("not an npy file".to_string()));
        }

        let major = reader.read_u8()?;
        let _minor = reader.read_u8()?;
        let header_len = match major {
            1 => reader.read_u16::<LittleEndian>()? as usize,
            2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
            v => return Err(Error::InvalidFormat(format!("unsupported npy version {}", v))),
        };

        let header = read_exactly(&mut reader, header_len, "npy header")?;
        let header = String::from_utf8(header)
            .map_err(|_| Error::InvalidFormat("npy header is not UTF-8".to_string()))?;
        let header = parse_literal(header.trim_end())?;

        if header.get("fortran_order") == Some(&PyValue::Bool(true)) {
            return Err(Error::InvalidFormat(
                "Fortran-ordered arrays are not supported".to_string(),
            ));
        }
        let shape = header
            .get("shape")
            .and_then(PyValue::as_dims)
            .ok_or_else(|| Error::InvalidFormat("npy header has no shape".to_string()))?;
        let &[len] = shape.as_slice() else {
            return Err(Error::InvalidFormat(format!(
                "expected a one-dimensional array, found shape {:?}",
                shape
            )));
        };
        let descr = header
            .get("descr")
            .ok_or_else(|| Error::InvalidFormat("npy header has no descr".to_string()))?;
        let layout = RecordLayout::from_descr(descr)?;

        if layout.itemsize == 0 {
            return Err(Error::InvalidFormat("npy records have no fields".to_string()));
        }
        let nbytes = layout.itemsize.checked_mul(len).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "npy shape ({},) of {}-byte records is too large",
                len, layout.itemsize
            ))
        })?;
        let data = read_exactly(&mut reader, nbytes, "npy payload")?;

        Ok(Self {
            layout: Arc::new(layout),
            data,
            len,
        })
    }

    /// Write `.npy` content
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        let dict = format!(
            "{{'descr': {}, 'fortran_order': False, 'shape': ({},), }}",
            self.layout.descr_repr(),
            self.len
        );

        // Magic + version + length field; version 1 stores the length in two bytes
        let mut major = 1u8;
        let mut prefix_len = NPY_MAGIC.len() + 2 + 2;
        let mut padded = align_up(prefix_len + dict.len() + 1) - prefix_len;
        if padded > u16::MAX as usize {
            major = 2;
            prefix_len += 2;
            padded = align_up(prefix_len + dict.len() + 1) - prefix_len;
        }
        let mut header = dict.into_bytes();
        header.resize(padded - 1, b' ');
        header.push(b'\n');

        writer.write_all(NPY_MAGIC)?;
        writer.write_u8(major)?;
        writer.write_u8(0)?;
        if major == 1 {
            writer.write_u16::<LittleEndian>(header.len() as u16)?;
        } else {
            writer.write_u32::<LittleEndian>(header.len() as u32)?;
        }
        writer.write_all(&header)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Write an `.npy` file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record layout
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Whether a field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.layout.field(name).is_some()
    }

    /// Raw bytes of record `i`
    pub fn record(&self, i: usize) -> &[u8] {
        let size = self.layout.itemsize;
        &self.data[i * size..(i + 1) * size]
    }

    /// New array holding the records at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let size = self.layout.itemsize;
        let mut data = Vec::with_capacity(size * indices.len());
        for &index in indices {
            if index >= self.len {
                return Err(Error::IndexOutOfRange {
                    index,
                    len: self.len,
                });
            }
            data.extend_from_slice(self.record(index));
        }
        Ok(Self {
            layout: Arc::clone(&self.layout),
            data,
            len: indices.len(),
        })
    }

    fn require_field(&self, name: &str) -> Result<&Field> {
        self.layout.field(name).ok_or_else(|| Error::MissingColumn {
            block: "structured array".to_string(),
            column: name.to_string(),
        })
    }

    /// Every value of a field rendered as text; subarray elements are comma-joined
    pub fn field_text(&self, name: &str) -> Result<Vec<String>> {
        let field = self.require_field(name)?;
        let count = field.count();
        Ok((0..self.len)
            .map(|i| {
                let record = self.record(i);
                if count == 1 {
                    field.element_text(record, 0)
                } else {
                    (0..count)
                        .map(|k| field.element_text(record, k))
                        .collect::<Vec<_>>()
                        .join(",")
                }
            })
            .collect())
    }

    /// Every value of a scalar numeric field as a float
    pub fn field_f64(&self, name: &str) -> Result<Vec<f64>> {
        let field = self.require_field(name)?;
        if !field.is_numeric() || field.count() != 1 {
            return Err(Error::InvalidFormat(format!(
                "field {} ({}) is not a numeric scalar",
                name, field.descr
            )));
        }
        (0..self.len)
            .map(|i| {
                field.element_f64(self.record(i), 0).ok_or_else(|| {
                    Error::InvalidFormat(format!("unreadable value in field {} row {}", name, i))
                })
            })
            .collect()
    }

    /// Every value of a scalar integer field
    pub fn field_u64(&self, name: &str) -> Result<Vec<u64>> {
        let field = self.require_field(name)?;
        if !matches!(field.kind, ScalarKind::Int | ScalarKind::UInt) || field.count() != 1 {
            return Err(Error::InvalidFormat(format!(
                "field {} ({}) is not an integer scalar",
                name, field.descr
            )));
        }
        (0..self.len)
            .map(|i| {
                field.element_u64(self.record(i), 0).ok_or_else(|| {
                    Error::InvalidFormat(format!("negative value in field {} row {}", name, i))
                })
            })
            .collect()
    }

    /// Set one scalar numeric element; the value is converted to the field's type
    pub fn set_f64(&mut self, row: usize, name: &str, value: f64) -> Result<()> {
        let field = self.require_field(name)?.clone();
        if row >= self.len {
            return Err(Error::IndexOutOfRange {
                index: row,
                len: self.len,
            });
        }
        let start = row * self.layout.itemsize + field.offset;
        let b = &mut self.data[start..start + field.element_size];
        let big = field.endianness == Endianness::Big;
        macro_rules! put {
            ($f:ident, $v:expr) => {
                if big {
                    BigEndian::$f(b, $v)
                } else {
                    LittleEndian::$f(b, $v)
                }
            };
        }
        match (field.kind, field.element_size) {
            (ScalarKind::Bool, 1) => b[0] = u8::from(value != 0.0),
            (ScalarKind::UInt, 1) => b[0] = value as u8,
            (ScalarKind::Int, 1) => b[0] = value as i8 as u8,
            (ScalarKind::UInt, 2) => put!(write_u16, value as u16),
            (ScalarKind::Int, 2) => put!(write_i16, value as i16),
            (ScalarKind::UInt, 4) => put!(write_u32, value as u32),
            (ScalarKind::Int, 4) => put!(write_i32, value as i32),
            (ScalarKind::UInt, 8) => put!(write_u64, value as u64),
            (ScalarKind::Int, 8) => put!(write_i64, value as i64),
            (ScalarKind::Float, 4) => put!(write_f32, value as f32),
            (ScalarKind::Float, 8) => put!(write_f64, value),
            _ => {
                return Err(Error::InvalidFormat(format!(
                    "field {} ({}) is not numeric",
                    name, field.descr
                )))
            }
        }
        Ok(())
    }

    /// Set a byte-string field, NUL-padding to the field width
    pub fn set_bytes(&mut self, row: usize, name: &str, value: &[u8]) -> Result<()> {
        let field = self.require_field(name)?.clone();
        if field.kind != ScalarKind::Bytes || value.len() > field.element_size {
            return Err(Error::InvalidFormat(format!(
                "{} bytes do not fit field {} ({})",
                value.len(),
                name,
                field.descr
            )));
        }
        if row >= self.len {
            return Err(Error::IndexOutOfRange {
                index: row,
                len: self.len,
            });
        }
        let start = row * self.layout.itemsize + field.offset;
        let b = &mut self.data[start..start + field.element_size];
        b.fill(0);
        b[..value.len()].copy_from_slice(value);
        Ok(())
    }
}
