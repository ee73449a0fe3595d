//! XMLRPC `methodResponse` parsing.
//!
//! Decodes replies of the shape
//! `<methodResponse><params><param><value>…</value></param>…</params></methodResponse>`
//! into a flat, ordered list of parameters. Each parameter is either a
//! scalar (`<string>`, `<int>`) or a `<struct>` of named members, and
//! structs may nest. Text inside value tags is whitespace-trimmed and
//! entity-decoded.
//!
//! The document walks through a small tag lexer into the same start/end
//! state machine the wire format implies; any tag that is unexpected for
//! the current state aborts parsing, and [`parse_reply`] returns `None`.
//!
//! ```
//! use kvkit::xmlrpc::{parse_reply, Value};
//!
//! let doc = "<methodResponse><params>\
//!            <param><value><string>ok</string></value></param>\
//!            </params></methodResponse>";
//! assert_eq!(parse_reply(doc), Some(vec![Value::Str("ok".into())]));
//! ```

/// One decoded parameter or struct member value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `<int>` contents; unparseable text decodes as 0.
    Int(i64),
    /// `<string>` contents, trimmed and entity-decoded.
    Str(String),
    /// `<struct>` members in document order.
    Struct(Vec<(String, Value)>),
}

/// Parses a reply document. Returns `None` on any structural violation or
/// when the document does not end in the accepting state.
pub fn parse_reply(input: &str) -> Option<Vec<Value>> {
    let mut parser = Parser::default();
    parser.run(input)
}

// Parser states, one per expected tag position. 11 and 12 are the scalar
// states; 100 is the accepting state.
const ST_START: u32 = 0;
const ST_RESPONSE: u32 = 1;
const ST_PARAMS: u32 = 2;
const ST_PARAM: u32 = 3;
const ST_VALUE: u32 = 4;
const ST_STRUCT: u32 = 5;
const ST_MEMBER: u32 = 6;
const ST_NAME: u32 = 7;
const ST_MEMBER_VALUE: u32 = 8;
const ST_STRING: u32 = 11;
const ST_INT: u32 = 12;
const ST_DONE: u32 = 100;

#[derive(Debug, Default)]
struct Parser {
    state: u32,
    depth: u32,
    /// State a scalar end-tag returns to: `ST_VALUE` for top-level scalars,
    /// `ST_MEMBER_VALUE` inside a struct member.
    scalar_return: u32,
    params: Vec<Value>,
    current: Option<Value>,
    frames: Vec<Vec<(String, Value)>>,
    names: Vec<String>,
}

impl Parser {
    fn run(&mut self, input: &str) -> Option<Vec<Value>> {
        let mut pos = 0;
        while pos < input.len() {
            let rest = &input[pos..];
            if let Some(stripped) = rest.strip_prefix("<?") {
                pos += 2 + stripped.find("?>")? + 2;
            } else if let Some(stripped) = rest.strip_prefix("<!--") {
                pos += 4 + stripped.find("-->")? + 3;
            } else if let Some(stripped) = rest.strip_prefix("<!") {
                pos += 2 + stripped.find('>')? + 1;
            } else if let Some(stripped) = rest.strip_prefix("</") {
                let end = stripped.find('>')?;
                self.end_element(stripped[..end].trim())?;
                pos += 2 + end + 1;
            } else if let Some(stripped) = rest.strip_prefix('<') {
                let end = stripped.find('>')?;
                let inner = stripped[..end].trim();
                let self_closing = inner.ends_with('/');
                let inner = inner.trim_end_matches('/').trim_end();
                let name = inner.split_whitespace().next()?;
                self.start_element(name)?;
                if self_closing {
                    self.end_element(name)?;
                }
                pos += 1 + end + 1;
            } else {
                let next = rest.find('<').unwrap_or(rest.len());
                let text = rest[..next].trim();
                if !text.is_empty() {
                    self.text(&decode_entities(text));
                }
                pos += next;
            }
        }

        if self.state == ST_DONE && self.frames.is_empty() && self.current.is_none() {
            Some(std::mem::take(&mut self.params))
        } else {
            None
        }
    }

    fn enter_scalar(&mut self, from: u32, tag: &str) -> Option<u32> {
        self.scalar_return = from;
        if tag.eq_ignore_ascii_case("string") {
            self.current = Some(Value::Str(String::new()));
            Some(ST_STRING)
        } else if tag.eq_ignore_ascii_case("int") {
            self.current = Some(Value::Int(0));
            Some(ST_INT)
        } else {
            None
        }
    }

    fn enter_struct(&mut self) -> u32 {
        self.frames.push(Vec::new());
        self.depth += 1;
        ST_STRUCT
    }

    fn start_element(&mut self, name: &str) -> Option<()> {
        let eq = |tag: &str| name.eq_ignore_ascii_case(tag);
        self.state = match self.state {
            ST_START if eq("methodResponse") => ST_RESPONSE,
            ST_RESPONSE if eq("params") => ST_PARAMS,
            ST_PARAMS if eq("param") => ST_PARAM,
            ST_PARAM if eq("value") => ST_VALUE,
            ST_VALUE if eq("struct") => self.enter_struct(),
            ST_VALUE => self.enter_scalar(ST_VALUE, name)?,
            ST_STRUCT if eq("member") => ST_MEMBER,
            ST_MEMBER if eq("name") => {
                self.names.push(String::new());
                ST_NAME
            }
            ST_NAME if eq("value") => ST_MEMBER_VALUE,
            ST_MEMBER_VALUE if eq("struct") => self.enter_struct(),
            ST_MEMBER_VALUE => self.enter_scalar(ST_MEMBER_VALUE, name)?,
            _ => return None,
        };
        Some(())
    }

    fn end_element(&mut self, name: &str) -> Option<()> {
        let eq = |tag: &str| name.eq_ignore_ascii_case(tag);
        self.state = match self.state {
            ST_RESPONSE if eq("methodResponse") => ST_DONE,
            ST_PARAMS if eq("params") => ST_RESPONSE,
            ST_PARAM if eq("param") => {
                let value = self.current.take()?;
                self.params.push(value);
                ST_PARAMS
            }
            ST_VALUE if eq("value") => {
                if self.depth == 0 {
                    ST_PARAM
                } else {
                    ST_MEMBER
                }
            }
            ST_STRUCT if eq("struct") => {
                self.depth = self.depth.checked_sub(1)?;
                let frame = self.frames.pop()?;
                self.current = Some(Value::Struct(frame));
                ST_VALUE
            }
            ST_MEMBER if eq("member") => {
                let member_name = self.names.pop()?;
                let value = self.current.take()?;
                self.frames.last_mut()?.push((member_name, value));
                ST_STRUCT
            }
            ST_NAME if eq("name") => ST_NAME,
            ST_MEMBER_VALUE if eq("value") => ST_MEMBER,
            ST_STRING if eq("string") => self.scalar_return,
            ST_INT if eq("int") => self.scalar_return,
            _ => return None,
        };
        Some(())
    }

    fn text(&mut self, text: &str) {
        match self.state {
            ST_NAME => {
                if let Some(name) = self.names.last_mut() {
                    *name = text.to_string();
                }
            }
            ST_STRING => self.current = Some(Value::Str(text.to_string())),
            ST_INT => self.current = Some(Value::Int(text.parse().unwrap_or(0))),
            // Whitespace and stray text elsewhere is ignored.
            _ => {}
        }
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let mut replaced = false;
        for (entity, ch) in [
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ] {
            if let Some(tail) = rest.strip_prefix(entity) {
                out.push(ch);
                rest = tail;
                replaced = true;
                break;
            }
        }
        if !replaced {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_params_decode_in_order() {
        let doc = "<methodResponse><params>\
                   <param><value><string>first</string></value></param>\
                   <param><value><int>42</int></value></param>\
                   </params></methodResponse>";
        assert_eq!(
            parse_reply(doc),
            Some(vec![Value::Str("first".into()), Value::Int(42)])
        );
    }

    #[test]
    fn struct_params_keep_member_order() {
        let doc = "<methodResponse><params><param><value><struct>\
                   <member><name>score</name><value><int>7</int></value></member>\
                   <member><name>verdict</name><value><string>spam</string></value></member>\
                   </struct></value></param></params></methodResponse>";
        let params = parse_reply(doc).unwrap();
        assert_eq!(
            params,
            vec![Value::Struct(vec![
                ("score".into(), Value::Int(7)),
                ("verdict".into(), Value::Str("spam".into())),
            ])]
        );
    }

    #[test]
    fn structs_nest() {
        let doc = "<methodResponse><params><param><value><struct>\
                   <member><name>outer</name><value><struct>\
                   <member><name>inner</name><value><int>1</int></value></member>\
                   </struct></value></member>\
                   </struct></value></param></params></methodResponse>";
        let params = parse_reply(doc).unwrap();
        assert_eq!(
            params,
            vec![Value::Struct(vec![(
                "outer".into(),
                Value::Struct(vec![("inner".into(), Value::Int(1))]),
            )])]
        );
    }

    #[test]
    fn text_is_trimmed_and_entities_decode() {
        let doc = "<methodResponse>\n  <params>\n    <param><value>\
                   <string>  a &amp; b &lt;c&gt;  </string>\
                   </value></param>\n  </params>\n</methodResponse>";
        assert_eq!(parse_reply(doc), Some(vec![Value::Str("a & b <c>".into())]));
    }

    #[test]
    fn declarations_and_comments_are_skipped() {
        let doc = "<?xml version=\"1.0\"?><!-- reply -->\
                   <methodResponse><params>\
                   <param><value><int>3</int></value></param>\
                   </params></methodResponse>";
        assert_eq!(parse_reply(doc), Some(vec![Value::Int(3)]));
    }

    #[test]
    fn unparseable_int_decodes_as_zero() {
        let doc = "<methodResponse><params>\
                   <param><value><int>forty-two</int></value></param>\
                   </params></methodResponse>";
        assert_eq!(parse_reply(doc), Some(vec![Value::Int(0)]));
    }

    #[test]
    fn empty_string_value_is_empty() {
        let doc = "<methodResponse><params>\
                   <param><value><string></string></value></param>\
                   </params></methodResponse>";
        assert_eq!(parse_reply(doc), Some(vec![Value::Str(String::new())]));
    }

    #[test]
    fn empty_params_decode_to_empty_table() {
        let doc = "<methodResponse><params></params></methodResponse>";
        assert_eq!(parse_reply(doc), Some(vec![]));
    }

    #[test]
    fn structural_violations_return_none() {
        // Wrong root.
        assert_eq!(parse_reply("<methodCall></methodCall>"), None);
        // Unexpected tag inside params.
        assert_eq!(
            parse_reply("<methodResponse><params><bogus/></params></methodResponse>"),
            None
        );
        // Member without a name.
        assert_eq!(
            parse_reply(
                "<methodResponse><params><param><value><struct>\
                 <member><value><int>1</int></value></member>\
                 </struct></value></param></params></methodResponse>"
            ),
            None
        );
        // Truncated document never reaches the accepting state.
        assert_eq!(parse_reply("<methodResponse><params>"), None);
        // Trailing garbage after completion.
        assert_eq!(
            parse_reply("<methodResponse><params></params></methodResponse><extra/>"),
            None
        );
        // Empty input.
        assert_eq!(parse_reply(""), None);
    }
}
