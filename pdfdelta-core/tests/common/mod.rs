//! Builders for synthetic PDF fixtures
//!
//! Tests assemble files object by object and let the builder emit either a
//! classic xref table or a cross-reference stream over the same body, so
//! both encodings can describe byte-identical object layouts.

/// Extra entries injected into a built cross-reference stream
#[derive(Debug, Clone, Copy)]
pub enum ExtraEntry {
    /// Type-2 record: object lives in a container at an index
    Compressed {
        num: u32,
        container: u32,
        index: u32,
    },
}

pub struct PdfBuilder {
    buf: Vec<u8>,
    offsets: Vec<(u32, u64)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            buf: b"%PDF-1.7\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    /// Append `<num> 0 obj ... endobj`
    pub fn add_object(&mut self, num: u32, body: &str) -> &mut Self {
        self.add_object_bytes(num, body.as_bytes())
    }

    pub fn add_object_bytes(&mut self, num: u32, body: &[u8]) -> &mut Self {
        self.offsets.push((num, self.buf.len() as u64));
        self.buf
            .extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
        self
    }

    /// Append an uncompressed object stream holding `objects` in order
    pub fn add_object_stream(&mut self, num: u32, objects: &[(u32, &str)]) -> &mut Self {
        let mut header = String::new();
        let mut body = String::new();
        for (packed_num, text) in objects {
            header.push_str(&format!("{packed_num} {} ", body.len()));
            body.push_str(text);
            body.push(' ');
        }
        let first = header.len();
        let mut data = header.into_bytes();
        data.extend_from_slice(body.as_bytes());

        let dict = format!(
            "<< /Type /ObjStm /N {} /First {first} /Length {} >>",
            objects.len(),
            data.len()
        );
        let mut full = dict.into_bytes();
        full.extend_from_slice(b"\nstream\n");
        full.extend_from_slice(&data);
        full.extend_from_slice(b"\nendstream");
        self.add_object_bytes(num, &full)
    }

    /// The body bytes written so far, before any xref tail
    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    pub fn offset_of(&self, num: u32) -> u64 {
        self.offsets
            .iter()
            .find(|(n, _)| *n == num)
            .map(|(_, offset)| *offset)
            .expect("object was added")
    }

    /// Finish with a classic xref table covering 0..=max, gaps free
    pub fn finish_classic(self, root: u32) -> Vec<u8> {
        let Self { mut buf, offsets } = self;
        let size = offsets.iter().map(|(n, _)| n + 1).max().unwrap_or(1);

        let xref_offset = buf.len();
        buf.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        buf.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..size {
            match offsets.iter().find(|(n, _)| *n == num) {
                Some((_, offset)) => {
                    buf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes())
                }
                None => buf.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} /Root {root} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
            )
            .as_bytes(),
        );
        buf
    }

    /// Finish with a cross-reference stream (object `stream_num`) using
    /// /W [1 2 1], covering every added object plus `extra` entries
    pub fn finish_xref_stream(self, root: u32, stream_num: u32, extra: &[ExtraEntry]) -> Vec<u8> {
        let Self { mut buf, offsets } = self;
        let stream_offset = buf.len() as u64;

        // (object number, record) pairs: type 0 free head, type 1 for every
        // written object including the xref stream itself, type 2 extras
        let mut records: Vec<(u32, [u8; 4])> = vec![(0, record(0, 0, 255))];
        for &(num, offset) in &offsets {
            records.push((num, record(1, offset as u16, 0)));
        }
        records.push((stream_num, record(1, stream_offset as u16, 0)));
        for entry in extra {
            let ExtraEntry::Compressed {
                num,
                container,
                index,
            } = *entry;
            records.push((num, record(2, container as u16, index as u8)));
        }
        records.sort_by_key(|&(num, _)| num);

        let size = records.last().map(|&(num, _)| num + 1).unwrap_or(1);
        let index = index_pairs(&records);
        let body: Vec<u8> = records.iter().flat_map(|(_, r)| r.iter().copied()).collect();

        let index_text = index
            .iter()
            .map(|(first, count)| format!("{first} {count}"))
            .collect::<Vec<_>>()
            .join(" ");
        let dict = format!(
            "<< /Type /XRef /Size {size} /W [1 2 1] /Index [{index_text}] /Root {root} 0 R /Length {} >>",
            body.len()
        );

        buf.extend_from_slice(format!("{stream_num} 0 obj\n{dict}\nstream\n").as_bytes());
        buf.extend_from_slice(&body);
        buf.extend_from_slice(b"\nendstream\nendobj\n");
        buf.extend_from_slice(format!("startxref\n{stream_offset}\n%%EOF\n").as_bytes());
        buf
    }
}

fn record(kind: u8, field2: u16, field3: u8) -> [u8; 4] {
    let [hi, lo] = field2.to_be_bytes();
    [kind, hi, lo, field3]
}

/// Contiguous [first, count] ranges over sorted record numbers
fn index_pairs(records: &[(u32, [u8; 4])]) -> Vec<(u32, u32)> {
    let mut pairs: Vec<(u32, u32)> = Vec::new();
    for &(num, _) in records {
        match pairs.last_mut() {
            Some((first, count)) if *first + *count == num => *count += 1,
            _ => pairs.push((num, 1)),
        }
    }
    pairs
}

/// The minimal one-page document used across tests
pub fn one_page_classic() -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    builder
        .add_object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .add_object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .add_object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    builder.finish_classic(1)
}
