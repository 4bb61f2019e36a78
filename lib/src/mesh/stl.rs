//! STL file loading.
//!
//! Supports both ASCII and binary STL, with format auto-detection.

use super::TriangleMesh;
use crate::geometry::Point3F;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Load a triangle mesh from an STL file.
///
/// Automatically detects whether the file is ASCII or binary format.
pub fn load_stl<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    // Read the first 80 bytes to check the format. Some binary files
    // also start with "solid", so printability is checked too.
    let mut header = [0u8; 80];
    let header_len = read_up_to(&mut reader, &mut header)?;
    let header_str = String::from_utf8_lossy(&header[..header_len]);
    let is_ascii = header_str.trim_start().starts_with("solid") && is_likely_ascii(&header[..header_len]);

    let file = File::open(path)?;
    let mesh = if is_ascii {
        load_stl_ascii(BufReader::new(file))
    } else {
        load_stl_binary(BufReader::new(file))
    }?;

    if mesh.is_empty() {
        return Err(Error::Mesh(format!(
            "no triangles found in {}",
            path.display()
        )));
    }
    Ok(mesh)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Binary STL files usually have null bytes in the header.
fn is_likely_ascii(header: &[u8]) -> bool {
    header
        .iter()
        .all(|&b| b >= 32 || b == b'\n' || b == b'\r' || b == b'\t')
}

fn load_stl_ascii<R: BufRead>(reader: R) -> Result<TriangleMesh> {
    let mut mesh = TriangleMesh::new();
    let mut vertices: Vec<Point3F> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("vertex") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.len() >= 3 {
                let x: f64 = parts[0]
                    .parse()
                    .map_err(|_| Error::Mesh("invalid vertex X coordinate".into()))?;
                let y: f64 = parts[1]
                    .parse()
                    .map_err(|_| Error::Mesh("invalid vertex Y coordinate".into()))?;
                let z: f64 = parts[2]
                    .parse()
                    .map_err(|_| Error::Mesh("invalid vertex Z coordinate".into()))?;
                vertices.push(Point3F::new(x, y, z));
            }
        } else if line.starts_with("endfacet") {
            if vertices.len() >= 3 {
                mesh.add_facet(vertices[0], vertices[1], vertices[2]);
            }
            vertices.clear();
        }
    }

    Ok(mesh)
}

fn load_stl_binary<R: Read>(mut reader: R) -> Result<TriangleMesh> {
    // Skip the 80-byte header
    let mut header = [0u8; 80];
    reader.read_exact(&mut header)?;

    // Triangle count, little-endian
    let mut count_bytes = [0u8; 4];
    reader.read_exact(&mut count_bytes)?;
    let triangle_count = u32::from_le_bytes(count_bytes) as usize;

    let mut mesh = TriangleMesh::with_capacity(triangle_count * 3, triangle_count);

    // Each record is 50 bytes: normal (12), three vertices (36),
    // attribute byte count (2). The stored normal is ignored.
    let mut record = [0u8; 50];
    for _ in 0..triangle_count {
        reader.read_exact(&mut record)?;

        let v0 = read_vertex(&record[12..24]);
        let v1 = read_vertex(&record[24..36]);
        let v2 = read_vertex(&record[36..48]);
        mesh.add_facet(v0, v1, v2);
    }

    Ok(mesh)
}

fn read_vertex(data: &[u8]) -> Point3F {
    let x = f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64;
    let y = f32::from_le_bytes([data[4], data[5], data[6], data[7]]) as f64;
    let z = f32::from_le_bytes([data[8], data[9], data[10], data[11]]) as f64;
    Point3F::new(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ASCII_STL: &str = r#"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 1 0 0
      vertex 1 1 0
      vertex 0 1 0
    endloop
  endfacet
endsolid test"#;

    #[test]
    fn test_load_ascii() {
        let mesh = load_stl_ascii(BufReader::new(Cursor::new(ASCII_STL))).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_load_binary() {
        let mut data = vec![0u8; 80]; // header
        data.extend_from_slice(&1u32.to_le_bytes()); // one triangle

        // normal
        for _ in 0..3 {
            data.extend_from_slice(&0f32.to_le_bytes());
        }
        // vertices
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                data.extend_from_slice(&c.to_le_bytes());
            }
        }
        data.extend_from_slice(&[0u8, 0u8]); // attribute bytes

        let mesh = load_stl_binary(Cursor::new(data)).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        let [v0, v1, _] = mesh.triangle_vertices(0);
        assert!((v0.x).abs() < 1e-9);
        assert!((v1.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        let mut file = File::create(&path).unwrap();
        file.write_all(ASCII_STL.as_bytes()).unwrap();
        drop(file);

        let mesh = load_stl(&path).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_missing_file() {
        assert!(load_stl("does-not-exist.stl").is_err());
    }
}
