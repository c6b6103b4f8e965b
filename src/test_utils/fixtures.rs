//! Release artifact fixtures.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Line that marks a fake binary as one that never binds its port.
pub const UNHEALTHY_MARKER: &str = "# unhealthy";

/// Builds an in-memory zip archive from `(path, content)` pairs.
pub fn zip_with_files(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);

    for (name, content) in files {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(content).expect("write zip entry");
    }

    zip.finish().expect("finish zip").into_inner()
}

/// Content of a fake relay binary for `tag`.
pub fn relay_binary(tag: &str, healthy: bool) -> Vec<u8> {
    let mut script = format!("#!/bin/sh\n# relay-server {tag}\n");
    if !healthy {
        script.push_str(UNHEALTHY_MARKER);
        script.push('\n');
    }
    script.push_str("exec sleep infinity\n");
    script.into_bytes()
}

/// A release archive laid out like the published ones:
/// `<binary>_<version>/<binary>` plus a README.
pub fn release_archive(binary_name: &str, tag: &str, healthy: bool) -> Vec<u8> {
    let version = tag.trim_start_matches('v');
    let dir = format!("{binary_name}_{version}");
    let binary_path = format!("{dir}/{binary_name}");
    let readme_path = format!("{dir}/README.md");
    let binary = relay_binary(tag, healthy);

    zip_with_files(&[
        (binary_path.as_str(), binary.as_slice()),
        (readme_path.as_str(), b"relay server\n".as_slice()),
    ])
}
