//! Terminal prompts used by the binary before a sweep starts. Nothing in the
//! engine reads from the terminal.

use std::io::{self, BufRead, Write};

use crate::config::parse_batch_sizes;

/// Ask for batch sizes until a valid list is entered. `Ok(None)` on EOF.
pub fn ask_batch_sizes<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
) -> io::Result<Option<Vec<usize>>> {
    loop {
        write!(out, "Batch sizes to test (comma-separated, e.g. 1,2,4,8): ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse_batch_sizes(&line) {
            Ok(sizes) => return Ok(Some(sizes)),
            Err(err) => writeln!(out, "error: {err}")?,
        }
    }
}

/// Yes/no confirmation. Only `y` / `yes` (any case) confirm; EOF declines.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<bool> {
    write!(out, "{question} (y/n): ")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
