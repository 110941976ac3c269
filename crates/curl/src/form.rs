//! Multipart form fields accepted by [`Easy::post`](crate::Easy::post).

use crate::engine::{Engine, FormPart, HandleKind};
use crate::error::CurlError;
use crate::handle::NativeHandle;
use bytes::Bytes;
use std::rc::Rc;
use tracing::{error, trace};

/// One field of a multipart post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    /// A plain value
    Content(String),
    /// A file or in-memory upload
    Upload(FormUpload),
}

impl From<&str> for FormField {
    fn from(value: &str) -> Self {
        FormField::Content(value.to_owned())
    }
}

impl From<String> for FormField {
    fn from(value: String) -> Self {
        FormField::Content(value)
    }
}

impl From<FormUpload> for FormField {
    fn from(upload: FormUpload) -> Self {
        FormField::Upload(upload)
    }
}

/// An upload field.
///
/// Without `data` the engine reads the file at `file`; with `data` the bytes are sent
/// as a file named `filename`, or `file` when no filename is given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormUpload {
    pub file: String,
    pub data: Option<Bytes>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Vec<String>,
    /// Streamed uploads are not supported, setting this makes the post fail
    pub stream_length: Option<u64>,
}

impl FormUpload {
    pub fn file<S: Into<String>>(file: S) -> Self {
        Self { file: file.into(), ..Self::default() }
    }

    pub fn buffer<S: Into<String>, B: Into<Bytes>>(filename: S, data: B) -> Self {
        Self { file: filename.into(), data: Some(data.into()), ..Self::default() }
    }

    pub fn content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn header<S: Into<String>>(mut self, header: S) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn stream_length(mut self, length: u64) -> Self {
        self.stream_length = Some(length);
        self
    }
}

impl FormField {
    fn into_part(self, name: String) -> Result<FormPart, CurlError> {
        let upload = match self {
            FormField::Content(value) => return Ok(FormPart::Content { name, value, headers: Vec::new() }),
            FormField::Upload(upload) => upload,
        };

        if upload.stream_length.is_some() {
            return Err(CurlError::unsupported_feature("streamed form upload"));
        }

        let FormUpload { file, data, content_type, filename, headers, .. } = upload;
        Ok(match data {
            Some(data) => FormPart::Buffer { name, filename: filename.unwrap_or(file), data, content_type, headers },
            None => FormPart::File { name, path: file, content_type, filename, headers },
        })
    }
}

/// A multipart form owned by the transfer it is posted with.
#[derive(Debug)]
pub(crate) struct Form<E: Engine> {
    handle: NativeHandle<E>,
    parts: usize,
}

impl<E: Engine> Form<E> {
    /// Builds a form from `fields`, in order.
    ///
    /// A failing field releases everything built so far.
    pub(crate) fn build<I, N, F>(engine: &Rc<E>, fields: I) -> Result<Self, CurlError>
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<String>,
        F: Into<FormField>,
    {
        let mut form = Form { handle: NativeHandle::open(engine, HandleKind::Form).map_err(CurlError::form_build)?, parts: 0 };

        for (name, field) in fields {
            let part = field.into().into_part(name.into())?;
            if let Err(e) = form.handle.engine().form_add(form.handle.raw(), &part) {
                error!(form = %form.handle.raw(), field = part.name(), cause = %e, "failed to add form part");
                return Err(CurlError::form_build(e));
            }
            trace!(form = %form.handle.raw(), field = part.name(), "added form part");
            form.parts += 1;
        }

        Ok(form)
    }

    #[inline]
    pub(crate) fn handle(&self) -> &NativeHandle<E> {
        &self.handle
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_part() {
        let part = FormField::from("value").into_part("field".to_owned()).unwrap();
        assert_eq!(part, FormPart::Content { name: "field".into(), value: "value".into(), headers: vec![] });
    }

    #[test]
    fn test_file_part() {
        let upload = FormUpload::file("/tmp/report.csv").content_type("text/csv").filename("report.csv");
        let part = FormField::from(upload).into_part("report".to_owned()).unwrap();
        assert_eq!(
            part,
            FormPart::File {
                name: "report".into(),
                path: "/tmp/report.csv".into(),
                content_type: Some("text/csv".into()),
                filename: Some("report.csv".into()),
                headers: vec![],
            }
        );
    }

    #[test]
    fn test_buffer_part_names() {
        let part = FormField::from(FormUpload::buffer("a.txt", "hello")).into_part("f".to_owned()).unwrap();
        assert!(matches!(part, FormPart::Buffer { ref filename, ref data, .. } if filename == "a.txt" && data == "hello"));

        let upload = FormUpload::buffer("a.txt", "hello").filename("b.txt").header("X-Part: 1");
        let part = FormField::from(upload).into_part("f".to_owned()).unwrap();
        assert!(matches!(part, FormPart::Buffer { ref filename, ref headers, .. } if filename == "b.txt" && headers.len() == 1));
    }

    #[test]
    fn test_stream_unsupported() {
        let upload = FormUpload::file("f").stream_length(123);
        let result = FormField::from(upload).into_part("field".to_owned());
        assert!(matches!(result, Err(CurlError::UnsupportedFeature { .. })));
    }
}
