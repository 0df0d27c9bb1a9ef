//! Paragraph breaking for expanded text streams.

use crate::expand::Datum;
use once_cell::sync::Lazy;
use regex::Regex;

static MULTIPLE_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

/// Values that refuse to be wrapped in a paragraph
pub trait BlockLevel {
    fn is_block_level(&self) -> bool {
        false
    }
}

impl BlockLevel for () {}

/// A formatted stream element
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<V> {
    Para(Vec<Datum<V>>),
    Block(Datum<V>),
}

impl<V> Flow<V> {
    /// Concatenated text of a paragraph, ignoring non-textual values.
    pub fn plain_text(&self) -> String {
        match self {
            Flow::Para(items) => items.iter().filter_map(Datum::as_text).collect(),
            Flow::Block(_) => String::new(),
        }
    }
}

fn is_block_level<V: BlockLevel>(datum: &Datum<V>) -> bool {
    match datum {
        Datum::Block(_) => true,
        Datum::Value(v) => v.is_block_level(),
        _ => false,
    }
}

/// Break an expanded stream into paragraphs at blank lines.
///
/// Does not recurse: handlers apply this once to their own body. Block
/// level values act as paragraph breaks and pass through on their own.
pub fn decode_flow<V: BlockLevel>(stream: Vec<Datum<V>>) -> Vec<Flow<V>> {
    let mut out = Vec::new();
    let mut accum: Vec<Datum<V>> = Vec::new();

    fn flush<V>(accum: &mut Vec<Datum<V>>, out: &mut Vec<Flow<V>>) {
        if !accum.is_empty() {
            out.push(Flow::Para(std::mem::take(accum)));
        }
    }

    for datum in stream {
        match datum {
            Datum::Text(text) if MULTIPLE_NEWLINES.is_match(&text) => {
                let bits: Vec<&str> = MULTIPLE_NEWLINES.split(&text).collect();
                let (first, rest) = bits.split_first().map_or(("", &[][..]), |(f, r)| (*f, r));
                if !first.is_empty() {
                    accum.push(Datum::Text(first.to_string()));
                }
                flush(&mut accum, &mut out);

                if let Some((last, middle)) = rest.split_last() {
                    for bit in middle {
                        if !bit.is_empty() {
                            out.push(Flow::Para(vec![Datum::Text(bit.to_string())]));
                        }
                    }
                    if !last.is_empty() {
                        accum.push(Datum::Text(last.to_string()));
                    }
                }
            }
            datum if is_block_level(&datum) => {
                flush(&mut accum, &mut out);
                out.push(Flow::Block(datum));
            }
            datum => accum.push(datum),
        }
    }
    flush(&mut accum, &mut out);
    out
}
