use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{OpenMode, StreamResult, UriStream};

/// Copy an entire source (local path or remote url) into the file at
/// `dest`, returning the number of bytes copied. A partially written
/// destination is removed before an error is returned.
pub fn copy_to_path(source: &str, dest: &Path) -> StreamResult<u64> {
    let mut stream = UriStream::open(source, OpenMode::ReadOnly)?;
    match copy_stream(&mut stream, dest) {
        Ok(total) => {
            info!("copied {} bytes from {} to {}", total, source, dest.display());
            Ok(total)
        }
        Err(e) => {
            let _ = std::fs::remove_file(dest);
            Err(e)
        }
    }
}

fn copy_stream(stream: &mut UriStream, dest: &Path) -> StreamResult<u64> {
    let mut out = File::create(dest)?;
    let mut chunk = [0u8; 4096];
    let mut total: u64 = 0;
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n])?;
        total += n as u64;
    }
    out.flush()?;
    Ok(total)
}
