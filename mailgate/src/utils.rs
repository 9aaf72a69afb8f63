use crate::err::{Error, Result};
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub fn trim(line: &mut Vec<u8>) {
    if let Some(&b'\n') = line.last() {
        line.pop();
    }
    if let Some(&b'\r') = line.last() {
        line.pop();
    }
}

pub fn slurp<P>(path: P) -> Result<Vec<u8>>
where
    P: AsRef<Path> + Display,
{
    let mut file =
        File::open(&path).map_err(|err| Error::TlsSetup(format!("cannot open {}: {}", path, err)))?;
    let mut ret = Vec::with_capacity(1024);
    file.read_to_end(&mut ret)?;
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_crlf() {
        let mut line = b"EHLO client.test\r\n".to_vec();
        trim(&mut line);
        assert_eq!(line, b"EHLO client.test");
        let mut bare = b"EHLO client.test\n".to_vec();
        trim(&mut bare);
        assert_eq!(bare, b"EHLO client.test");
        let mut empty = Vec::new();
        trim(&mut empty);
        assert!(empty.is_empty());
    }
}
