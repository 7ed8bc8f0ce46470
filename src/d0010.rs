// D0010 module
//
// Handles parsing of pipe-delimited D0010 flow files carrying meter
// readings between energy-market participants. Each line holds a record
// type, MPAN, meter serial, reading date/time, register id, reading
// value, and reading type.

pub mod parser;

pub use parser::{
    D0010ParseError, D0010Parser, ParsedFile, ParsedReading, ReadingType, SkipReason, SkippedLine,
};
