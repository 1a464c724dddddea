/// STL file parser for binary and ASCII formats
use std::fs;
use std::path::Path;

use log::{debug, info};
use nalgebra::{Point3, Vector3};
use nom::{
    bytes::complete::{take, take_till1},
    character::complete::{space0, space1},
    multi::{count, many_m_n},
    number::complete::{float, le_f32, le_u32},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::MeshError;
use crate::geometry::{Triangle, Vertex};

/// Ignored header at the start of a binary STL
const HEADER_LEN: usize = 80;
/// Header plus the little-endian triangle count
const PREAMBLE_LEN: usize = HEADER_LEN + 4;
/// Normal, three positions and the attribute byte count
const FACET_LEN: usize = 50;
const ASCII_MAGIC: &[u8] = b"solid";

/// On-disk encoding of an STL file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlEncoding {
    Ascii,
    Binary,
}

/// Decide the encoding from the first five bytes.
pub fn detect_encoding(data: &[u8]) -> StlEncoding {
    if data.starts_with(ASCII_MAGIC) {
        StlEncoding::Ascii
    } else {
        StlEncoding::Binary
    }
}

/// Read and parse an STL file into a triangle soup.
pub fn load_stl(path: impl AsRef<Path>) -> Result<Vec<Triangle>, MeshError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loading {} ({} bytes)", path.display(), data.len());
    parse_stl(&data)
}

/// Detect and parse STL data (binary or ASCII).
///
/// Anything shorter than a binary preamble is rejected before detection,
/// whichever encoding it claims.
pub fn parse_stl(data: &[u8]) -> Result<Vec<Triangle>, MeshError> {
    if data.len() < PREAMBLE_LEN {
        return Err(MeshError::Format(format!(
            "file too small to be an STL ({} bytes, need at least {PREAMBLE_LEN})",
            data.len()
        )));
    }

    let triangles = match detect_encoding(data) {
        StlEncoding::Ascii => {
            debug!("Detected ASCII STL");
            let triangles = parse_ascii_stl(&String::from_utf8_lossy(data));
            if triangles.is_empty() && matches_binary_layout(data) {
                // Binary file whose free-form header happens to begin with "solid"
                info!("ASCII header but no facets; reading as binary STL");
                parse_binary_stl(data)?
            } else {
                triangles
            }
        }
        StlEncoding::Binary => {
            debug!("Detected binary STL");
            parse_binary_stl(data)?
        }
    };

    if triangles.is_empty() {
        return Err(MeshError::Empty);
    }

    info!("Parsed {} triangles", triangles.len());
    Ok(triangles)
}

/// Parse a binary STL file.
///
/// The file must hold at least as many facets as the header declares;
/// trailing bytes after the last declared facet are ignored.
pub fn parse_binary_stl(data: &[u8]) -> Result<Vec<Triangle>, MeshError> {
    if data.len() < PREAMBLE_LEN {
        return Err(MeshError::Format(format!(
            "file too small to be a binary STL ({} bytes, need at least {PREAMBLE_LEN})",
            data.len()
        )));
    }

    let declared = declared_triangle_count(data);
    match expected_binary_len(declared) {
        Some(expected) if data.len() >= expected => {}
        Some(expected) => {
            return Err(MeshError::Format(format!(
                "truncated binary STL: header declares {declared} triangles ({expected} bytes) but file has {} bytes",
                data.len()
            )));
        }
        None => {
            return Err(MeshError::Format(format!(
                "binary STL declares an impossible triangle count ({declared})"
            )));
        }
    }

    debug!("Binary STL declares {declared} triangles");

    let (_, triangles) = count(binary_facet, declared)(&data[PREAMBLE_LEN..])
        .map_err(|err| MeshError::Format(format!("malformed facet data: {err}")))?;

    Ok(triangles)
}

/// Parse an ASCII STL file.
///
/// Line oriented and permissive: only `facet` and `vertex` lines are read,
/// everything else is skipped. Every third vertex closes a triangle using the
/// most recent facet normal. Missing or unparsable components read as zero.
pub fn parse_ascii_stl(input: &str) -> Vec<Triangle> {
    let mut triangles = Vec::new();
    let mut normal = Vector3::zeros();
    let mut pending = [Vertex::with_normal(Point3::origin(), Vector3::zeros()); 3];
    let mut filled = 0;

    for line in input.lines() {
        match classify_line(line) {
            AsciiLine::Facet(n) => normal = n,
            AsciiLine::Vertex(position) => {
                pending[filled] = Vertex::with_normal(position, normal);
                filled += 1;
                if filled == 3 {
                    triangles.push(Triangle { vertices: pending });
                    filled = 0;
                }
            }
            AsciiLine::Other => {}
        }
    }

    triangles
}

fn declared_triangle_count(data: &[u8]) -> usize {
    let parsed: IResult<&[u8], u32> = le_u32(&data[HEADER_LEN..PREAMBLE_LEN]);
    parsed.map(|(_, n)| n as usize).unwrap_or(0)
}

fn expected_binary_len(triangles: usize) -> Option<usize> {
    triangles
        .checked_mul(FACET_LEN)
        .and_then(|body| body.checked_add(PREAMBLE_LEN))
}

fn matches_binary_layout(data: &[u8]) -> bool {
    data.len() >= PREAMBLE_LEN
        && expected_binary_len(declared_triangle_count(data)) == Some(data.len())
}

fn le_vec3(input: &[u8]) -> IResult<&[u8], Vector3<f32>> {
    let (input, (x, y, z)) = tuple((le_f32, le_f32, le_f32))(input)?;
    Ok((input, Vector3::new(x, y, z)))
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Triangle> {
    let (input, normal) = le_vec3(input)?;
    let (input, a) = le_vec3(input)?;
    let (input, b) = le_vec3(input)?;
    let (input, c) = le_vec3(input)?;
    // Attribute byte count
    let (input, _) = take(2usize)(input)?;

    let vertex = |p: Vector3<f32>| Vertex::with_normal(Point3::from(p), normal);
    Ok((input, Triangle::new(vertex(a), vertex(b), vertex(c))))
}

enum AsciiLine {
    Facet(Vector3<f32>),
    Vertex(Point3<f32>),
    Other,
}

fn classify_line(line: &str) -> AsciiLine {
    match token(line) {
        Ok((rest, "facet")) => {
            // The word after "facet" is expected to be "normal" but is not checked
            let rest = token(rest).map(|(after, _)| after).unwrap_or("");
            AsciiLine::Facet(Vector3::from(components(rest)))
        }
        Ok((rest, "vertex")) => AsciiLine::Vertex(Point3::from(components(rest))),
        _ => AsciiLine::Other,
    }
}

fn token(input: &str) -> IResult<&str, &str> {
    preceded(space0, take_till1(|c: char| c.is_whitespace()))(input)
}

/// Up to three whitespace-separated floats; reading stops at the first bad one.
fn components(input: &str) -> [f32; 3] {
    let parsed: IResult<&str, Vec<f32>> = many_m_n(0, 3, preceded(space1, float))(input);

    let mut out = [0.0; 3];
    if let Ok((_, values)) = parsed {
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet_bytes(normal: [f32; 3], corners: [[f32; 3]; 3]) -> Vec<u8> {
        let mut out = Vec::with_capacity(FACET_LEN);
        for value in normal.iter().chain(corners.iter().flatten()) {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn binary_stl(header: &[u8], facets: &[([f32; 3], [[f32; 3]; 3])]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[..header.len()].copy_from_slice(header);
        data.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for (normal, corners) in facets {
            data.extend(facet_bytes(*normal, *corners));
        }
        data
    }

    const TRI: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn test_parse_binary_header() {
        let mut data = vec![0u8; 84];
        // Set triangle count to 0
        data[80..84].copy_from_slice(&0u32.to_le_bytes());

        assert!(parse_binary_stl(&data).unwrap().is_empty());
        assert!(matches!(parse_stl(&data), Err(MeshError::Empty)));
    }

    #[test]
    fn test_binary_too_small() {
        let data = vec![0u8; 83];
        assert!(matches!(parse_stl(&data), Err(MeshError::Format(_))));
    }

    #[test]
    fn test_binary_triangle_count_and_normals() {
        let facets = [
            ([0.0, 0.0, 1.0], TRI),
            ([0.0, 1.0, 0.0], [[2.0, 2.0, 2.0], [3.0, 2.0, 2.0], [2.0, 3.0, 2.0]]),
            ([1.0, 0.0, 0.0], [[-1.0, 0.0, 5.0], [-1.0, 1.0, 5.0], [-1.0, 0.0, 6.0]]),
        ];
        let triangles = parse_stl(&binary_stl(b"binary part", &facets)).unwrap();

        assert_eq!(triangles.len(), 3);
        assert_eq!(triangles[1].vertices[0].position, Point3::new(2.0, 2.0, 2.0));
        assert_eq!(triangles[2].vertices[2].position, Point3::new(-1.0, 0.0, 6.0));
        for (triangle, (normal, _)) in triangles.iter().zip(facets.iter()) {
            for vertex in &triangle.vertices {
                assert_eq!(vertex.normal, Vector3::from(*normal));
            }
        }
    }

    #[test]
    fn test_binary_truncated_fails() {
        let mut data = binary_stl(b"", &[([0.0, 0.0, 1.0], TRI), ([0.0, 0.0, 1.0], TRI)]);
        data.truncate(data.len() - 10);
        assert!(matches!(parse_stl(&data), Err(MeshError::Format(_))));
    }

    #[test]
    fn test_binary_trailing_bytes_ignored() {
        let mut data = binary_stl(b"", &[([0.0, 0.0, 1.0], TRI)]);
        data.extend_from_slice(b"trailing garbage");
        assert_eq!(parse_stl(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_binary_with_solid_header() {
        let data = binary_stl(b"solid exported by a CAD tool", &[([0.0, 0.0, 1.0], TRI)]);
        assert_eq!(detect_encoding(&data), StlEncoding::Ascii);
        assert_eq!(parse_stl(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_ascii() {
        let text = "solid cube\n\
            facet normal 0 0 1\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 1 0 0\n\
                vertex 1 1 0\n\
              endloop\n\
            endfacet\n\
            facet normal 0 0 -1\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 1 1 0\n\
                vertex 0 1 0\n\
              endloop\n\
            endfacet\n\
            endsolid cube\n";

        let triangles = parse_stl(text.as_bytes()).unwrap();
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0].vertices[2].position, Point3::new(1.0, 1.0, 0.0));
        assert_eq!(triangles[1].vertices[0].normal, Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_parse_ascii_permissive() {
        let text = "solid\r\n\
            \tfacet normal 1.5e0 -2 3.25\r\n\
            this line is ignored\r\n\
            \t\tvertex -1.0e-1 2 3\r\n\
            \t\tvertex 4 5\r\n\
            \r\n\
            \t\tvertex 7 8 9 10\r\n\
            endsolid";

        let triangles = parse_ascii_stl(text);
        assert_eq!(triangles.len(), 1);
        let [a, b, c] = triangles[0].vertices;
        assert_eq!(a.normal, Vector3::new(1.5, -2.0, 3.25));
        assert_eq!(a.position, Point3::new(-0.1, 2.0, 3.0));
        // Missing component reads as zero
        assert_eq!(b.position, Point3::new(4.0, 5.0, 0.0));
        assert_eq!(c.position, Point3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_parse_ascii_incomplete_triangle_dropped() {
        let text = "solid s\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid s\n";
        assert!(text.len() >= PREAMBLE_LEN);
        assert!(parse_ascii_stl(text).is_empty());
        assert!(matches!(parse_stl(text.as_bytes()), Err(MeshError::Empty)));
    }

    #[test]
    fn test_short_ascii_rejected_as_too_small() {
        let text = b"solid x\nendsolid x\n";
        assert_eq!(detect_encoding(text), StlEncoding::Ascii);
        assert!(matches!(parse_stl(text), Err(MeshError::Format(_))));
        assert!(matches!(parse_stl(&[]), Err(MeshError::Format(_))));
    }

    #[test]
    fn test_ascii_without_facets_is_empty() {
        let text = format!("solid {}\nendsolid\n", "x".repeat(90));
        assert!(matches!(parse_stl(text.as_bytes()), Err(MeshError::Empty)));
    }

    #[test]
    fn test_vertices_pair_across_facets() {
        // Vertex grouping is by consecutive vertex lines, not by facet blocks
        let text = "solid s\n\
            facet normal 0 0 1\nvertex 0 0 0\nvertex 1 0 0\n\
            facet normal 0 1 0\nvertex 0 1 0\nvertex 2 2 2\nvertex 3 3 3\nvertex 4 4 4\n";
        let triangles = parse_ascii_stl(text);
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0].vertices[0].normal, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(triangles[0].vertices[2].normal, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(triangles[1].vertices[0].position, Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_stl("/definitely/not/here.stl").unwrap_err();
        assert!(matches!(err, MeshError::Io { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        fs::write(&path, binary_stl(b"", &[([0.0, 0.0, 1.0], TRI)])).unwrap();
        assert_eq!(load_stl(&path).unwrap().len(), 1);
    }
}
