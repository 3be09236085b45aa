use std::fmt::{Debug, Display};

use serde::Serialize;

/// Line written before and after every section label.
pub const SECTION_SEPARATOR: &str =
    "\n*************************************************************\n";

/// Section labels, in the order they appear in every capture.
pub const SECTIONS: [&str; 3] = ["Request", "Response", "error"];

/// Turns a request / response / error triple into the bytes of one capture.
///
/// Implementations must be pure and must not fail: absent values render as
/// empty sections.
pub trait Formatter<Req: ?Sized, Resp: ?Sized>: Send + Sync {
    fn format(&self, req: Option<&Req>, resp: Option<&Resp>, err: Option<&dyn Display>) -> Vec<u8>;
}

/// Appends a labeled section header.
pub fn write_header(buf: &mut Vec<u8>, label: &str) {
    buf.extend_from_slice(SECTION_SEPARATOR.as_bytes());
    buf.extend_from_slice(label.as_bytes());
    buf.extend_from_slice(SECTION_SEPARATOR.as_bytes());
}

/// Appends the error section content: the error's display text, or nothing.
pub fn write_error(buf: &mut Vec<u8>, err: Option<&dyn Display>) {
    if let Some(err) = err {
        buf.extend_from_slice(err.to_string().as_bytes());
    }
}

/// Pretty-prints values with their `{:#?}` representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFormatter;

impl<Req, Resp> Formatter<Req, Resp> for DebugFormatter
where
    Req: Debug + ?Sized,
    Resp: Debug + ?Sized,
{
    fn format(&self, req: Option<&Req>, resp: Option<&Resp>, err: Option<&dyn Display>) -> Vec<u8> {
        let mut buf = Vec::new();

        write_header(&mut buf, SECTIONS[0]);
        if let Some(req) = req {
            buf.extend_from_slice(format!("{req:#?}\n").as_bytes());
        }

        write_header(&mut buf, SECTIONS[1]);
        if let Some(resp) = resp {
            buf.extend_from_slice(format!("{resp:#?}\n").as_bytes());
        }

        write_header(&mut buf, SECTIONS[2]);
        write_error(&mut buf, err);

        buf
    }
}

/// Pretty-prints values as JSON.
///
/// A value that fails to serialize renders the serializer's error text in
/// its section.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn write_value<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) {
        match serde_json::to_vec_pretty(value) {
            Ok(json) => buf.extend_from_slice(&json),
            Err(e) => buf.extend_from_slice(format!("<unserializable: {e}>").as_bytes()),
        }
        buf.push(b'\n');
    }
}

impl<Req, Resp> Formatter<Req, Resp> for JsonFormatter
where
    Req: Serialize + ?Sized,
    Resp: Serialize + ?Sized,
{
    fn format(&self, req: Option<&Req>, resp: Option<&Resp>, err: Option<&dyn Display>) -> Vec<u8> {
        let mut buf = Vec::new();

        write_header(&mut buf, SECTIONS[0]);
        if let Some(req) = req {
            Self::write_value(&mut buf, req);
        }

        write_header(&mut buf, SECTIONS[1]);
        if let Some(resp) = resp {
            Self::write_value(&mut buf, resp);
        }

        write_header(&mut buf, SECTIONS[2]);
        write_error(&mut buf, err);

        buf
    }
}
