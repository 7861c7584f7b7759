//! Helpers for building small synthetic PDFs in unit tests

/// Assemble a classic-xref PDF from numbered object bodies. Object 1 is
/// assumed to be the catalog; gaps in the numbering become free entries.
pub fn build_pdf(objects: &[(u32, &str)], trailer_extra: &str) -> Vec<u8> {
    let mut pdf = b"%PDF-1.7\n".to_vec();
    let mut offsets: Vec<(u32, usize)> = Vec::new();

    for (num, body) in objects {
        offsets.push((*num, pdf.len()));
        pdf.extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    let xref_offset = pdf.len();
    let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    pdf.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for num in 1..size {
        match offsets.iter().find(|(n, _)| *n == num) {
            Some((_, offset)) => {
                pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes())
            }
            None => pdf.extend_from_slice(b"0000000000 00000 f \n"),
        }
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {size} /Root 1 0 R {trailer_extra}>>\nstartxref\n{xref_offset}\n%%EOF\n"
        )
        .as_bytes(),
    );
    pdf
}

/// The catalog/pages/page triple every page-tree test starts from
pub fn one_page_pdf() -> Vec<u8> {
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>"),
        ],
        "",
    )
}
