use std::io::{self, Write};

use serde::Serialize;

use crate::app::CycleSummary;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &CycleSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
