//! `multipart/form-data` parsing.
//!
//! The body is already buffered, so the `multer` stream is a single chunk
//! driven to completion with `futures::executor::block_on`. The whole stream
//! is bounded by `max_memory`.

use bytes::Bytes;
use futures::executor::block_on;
use futures::stream;
use multer::{Constraints, Multipart, SizeLimit};

use super::form::{FileHeader, FormData};

/// Parse a multipart body. `content_type` must carry the boundary.
pub fn parse_multipart(body: &[u8], content_type: &str, max_memory: usize) -> Result<FormData, multer::Error> {
    let boundary = multer::parse_boundary(content_type)?;
    let chunk = Bytes::copy_from_slice(body);
    let source = stream::once(async move { Ok::<Bytes, std::io::Error>(chunk) });
    let limit = u64::try_from(max_memory).unwrap_or(u64::MAX);
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let mut multipart = Multipart::with_constraints(source, boundary, constraints);

    block_on(async move {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let data = field.bytes().await?;
            match filename {
                Some(filename) => form.files.entry(name).or_default().push(FileHeader {
                    filename,
                    content_type,
                    bytes: data.to_vec(),
                }),
                None => form.values.add(name, String::from_utf8_lossy(&data)),
            }
        }
        Ok::<_, multer::Error>(form)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-NF-BOUNDARY";

    fn body() -> Vec<u8> {
        format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\r\n\
             hello\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"doc.xml\"\r\n\
             Content-Type: text/xml\r\n\r\n\
             <xml><a>x</a></xml>\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        )
        .into_bytes()
    }

    #[test]
    fn test_values_and_files() {
        let ct = format!("multipart/form-data; boundary={BOUNDARY}");
        let form = parse_multipart(&body(), &ct, 1 << 20).unwrap();
        assert_eq!(form.value("a"), Some("hello"));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename, "doc.xml");
        assert_eq!(file.content_type.as_deref(), Some("text/xml"));
        assert_eq!(file.bytes, b"<xml><a>x</a></xml>");
    }

    #[test]
    fn test_size_limit() {
        let ct = format!("multipart/form-data; boundary={BOUNDARY}");
        assert!(parse_multipart(&body(), &ct, 16).is_err());
    }

    #[test]
    fn test_missing_boundary() {
        assert!(parse_multipart(&body(), "multipart/form-data", 1 << 20).is_err());
    }
}
