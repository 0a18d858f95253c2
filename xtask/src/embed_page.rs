//! Gzip the device's update page into a C header for PROGMEM embedding.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};

pub const DEFAULT_INPUT: &str = "ui/page.html";
pub const DEFAULT_OUTPUT: &str = "src/AsyncMinimalOTAPage.h";

const LINE_WIDTH: usize = 80;

/// Gzip with a zeroed mtime so the same page always yields the same bytes.
pub fn compress(page: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::best());
    encoder.write_all(page)?;
    Ok(encoder.finish()?)
}

/// Brace-enclosed C initializer, byte values wrapped at 80 columns.
pub fn format_bytes(data: &[u8]) -> String {
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut width = 0;

    for value in data.iter().map(u8::to_string) {
        match lines.last_mut() {
            Some(line) if width + 1 + value.len() <= LINE_WIDTH => {
                width += 1 + value.len();
                line.push(value);
            }
            _ => {
                width = value.len();
                lines.push(vec![value]);
            }
        }
    }

    let body = lines
        .iter()
        .map(|line| line.join(","))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{body}\n}}")
}

pub fn render_header(data: &[u8]) -> String {
    format!(
        "#ifndef AsyncMinimalOTAPage_h\n\
         #define AsyncMinimalOTAPage_h\n\
         \n\
         const uint32_t MINIMAL_HTML_SIZE = {size};\n\
         const uint8_t MINIMAL_HTML[] PROGMEM = {data};\n\
         \n\
         #endif\n",
        size = data.len(),
        data = format_bytes(data),
    )
}

/// Compress `input` and write the header to `output`. Returns the compressed size.
pub fn embed_page(input: &Path, output: &Path) -> Result<usize> {
    let page = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let data = compress(&page)?;
    std::fs::write(output, render_header(&data))
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(data.len())
}
