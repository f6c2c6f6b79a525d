//! Wavefront OBJ reader producing a [`SegmentedMesh`].
//!
//! Only the records needed for segmentation are interpreted:
//!
//! - `v x y z` vertices (an optional `w` is ignored),
//! - `f a b c ...` faces with 1-based (or negative, relative) vertex
//!   references in any of the `i`, `i/t`, `i//n`, `i/t/n` forms,
//! - `g name` / `o name` segment markers.
//!
//! Comments, blank lines and every other record kind are skipped.
//!
//! # Segmentation
//!
//! A new segment starts exactly at each group marker and closes at the next
//! marker or at the end of input (the trailing segment is always kept).
//! Faces appearing before the first marker form a leading segment called
//! `default`. A file with N markers therefore yields N segments, or N + 1
//! when faces precede the first marker. Markers without faces produce empty
//! segments; they are kept and reported as warnings.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::geom::mesh::{Segment, SegmentedMesh};
use crate::{Point, TriangleIndex};

/// Name given to faces read before any group marker.
pub const DEFAULT_SEGMENT_NAME: &str = "default";

/// Reads an OBJ file.
///
/// # Arguments
/// * `path` - Path to the `.obj` file
pub fn read_obj(path: &Path) -> Result<SegmentedMesh> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mesh = parse_lines(BufReader::new(file), path)?;
    debug!(
        "Loaded {}: {} vertices, {} triangles in {} segments",
        path.display(),
        mesh.vertices().len(),
        mesh.face_count(),
        mesh.segment_count()
    );
    Ok(mesh)
}

/// Parses OBJ content from any buffered reader.
pub fn parse_obj<R: BufRead>(reader: R) -> Result<SegmentedMesh> {
    parse_lines(reader, Path::new("<stream>"))
}

fn parse_lines<R: BufRead>(reader: R, source: &Path) -> Result<SegmentedMesh> {
    let mut vertices: Vec<Point> = Vec::new();
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<Segment> = None;

    for (i, line_result) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line_result.map_err(|e| Error::io(source, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let Some(kind) = tokens.next() else {
            continue;
        };

        match kind {
            "v" => {
                let coords = tokens
                    .take(3)
                    .map(|s| s.parse::<f64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::malformed(line_no, &line, format!("invalid coordinate: {e}")))?;
                if coords.len() != 3 {
                    return Err(Error::malformed(
                        line_no,
                        &line,
                        format!("expected 3 coordinates, got {}", coords.len()),
                    ));
                }
                let pt = Point::new(coords[0], coords[1], coords[2]);
                if !pt.is_finite() {
                    return Err(Error::malformed(line_no, &line, "non-finite coordinate"));
                }
                vertices.push(pt);
            }
            "f" => {
                let refs = tokens
                    .map(|tok| resolve_vertex_ref(tok, vertices.len()))
                    .collect::<std::result::Result<Vec<_>, String>>()
                    .map_err(|reason| Error::malformed(line_no, &line, reason))?;
                if refs.len() < 3 {
                    return Err(Error::malformed(
                        line_no,
                        &line,
                        format!("face needs at least 3 vertices, got {}", refs.len()),
                    ));
                }
                let segment = current.get_or_insert_with(|| Segment::new(DEFAULT_SEGMENT_NAME, vec![]));
                // Fan triangulation: k references give k - 2 triangles
                for k in 1..refs.len() - 1 {
                    segment
                        .faces
                        .push(TriangleIndex(refs[0], refs[k], refs[k + 1]));
                }
            }
            "g" | "o" => {
                if let Some(seg) = current.take() {
                    segments.push(seg);
                }
                let name: Vec<&str> = tokens.collect();
                let name = if name.is_empty() {
                    format!("segment_{}", segments.len())
                } else {
                    name.join(" ")
                };
                current = Some(Segment::new(&name, vec![]));
            }
            _ => {
                trace!("Skipping OBJ record `{kind}` at line {line_no}");
            }
        }
    }

    if let Some(seg) = current.take() {
        segments.push(seg);
    }

    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            warn!("Segment {i} ({}) has no faces", seg.name);
        }
    }

    SegmentedMesh::new(vertices, segments)
}

/// Converts one face reference into a 0-based vertex index.
///
/// `num_vertices` is the number of vertices read so far; references to
/// vertices not yet defined are rejected.
fn resolve_vertex_ref(token: &str, num_vertices: usize) -> std::result::Result<usize, String> {
    let index_str = token.split('/').next().unwrap_or(token);
    let index: i64 = index_str
        .parse()
        .map_err(|_| format!("invalid vertex reference `{token}`"))?;

    let resolved = match index {
        0 => return Err("vertex references are 1-based, got 0".to_string()),
        i if i > 0 => (i - 1) as usize,
        i => {
            // Negative references count back from the last vertex read
            let back = i.unsigned_abs() as usize;
            if back > num_vertices {
                return Err(format!("relative vertex reference {i} points before the first vertex"));
            }
            num_vertices - back
        }
    };

    if resolved >= num_vertices {
        return Err(format!(
            "vertex reference {index} does not exist ({num_vertices} vertices defined)"
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::tempdir;

    const TWO_PARTS: &str = "\
# exported model
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
g lower
f 1 2 3
f 1 3 4
# 2 faces
g upper
usemtl steel
f 1/1/1 2/2/2 3/3/3
";

    #[test]
    fn test_two_groups() -> anyhow::Result<()> {
        let mesh = parse_obj(Cursor::new(TWO_PARTS))?;
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.segment_count(), 2);
        assert_eq!(mesh.segment_names(), vec!["lower", "upper"]);
        assert_eq!(mesh.segments()[0].faces, vec![TriangleIndex(0, 1, 2), TriangleIndex(0, 2, 3)]);
        assert_eq!(mesh.segments()[1].faces, vec![TriangleIndex(0, 1, 2)]);
        Ok(())
    }

    #[test]
    fn test_comment_does_not_close_segment() -> anyhow::Result<()> {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\ng a\n# note\nf 1 2 3\n# note\nf 3 2 1\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(mesh.segment_count(), 1);
        assert_eq!(mesh.segments()[0].faces.len(), 2);
        Ok(())
    }

    #[test]
    fn test_leading_faces_form_default_segment() -> anyhow::Result<()> {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\ng named\nf 1 2 3\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(mesh.segment_names(), vec![DEFAULT_SEGMENT_NAME, "named"]);
        Ok(())
    }

    #[test]
    fn test_empty_and_unnamed_groups_are_kept() -> anyhow::Result<()> {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\ng\ng b\nf 1 2 3\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(mesh.segment_names(), vec!["segment_0", "b"]);
        assert!(mesh.segments()[0].is_empty());
        Ok(())
    }

    #[test]
    fn test_polygon_is_fan_triangulated() -> anyhow::Result<()> {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv -1 1 0\ng p\nf 1 2 3 4 5\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(
            mesh.segments()[0].faces,
            vec![TriangleIndex(0, 1, 2), TriangleIndex(0, 2, 3), TriangleIndex(0, 3, 4)]
        );
        Ok(())
    }

    #[test]
    fn test_negative_references() -> anyhow::Result<()> {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\ng n\nf -3 -2 -1\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(mesh.segments()[0].faces, vec![TriangleIndex(0, 1, 2)]);
        Ok(())
    }

    #[test]
    fn test_dangling_reference_is_an_error() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\ng a\nf 1 2 7\n";
        match parse_obj(Cursor::new(src)) {
            Err(Error::MalformedMesh { line, content, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(content, "f 1 2 7");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_face_before_its_vertices_is_an_error() {
        let src = "g a\nf 1 2 3\nv 0 0 0\nv 1 0 0\nv 0 1 0\n";
        match parse_obj(Cursor::new(src)) {
            Err(Error::MalformedMesh { line, reason, .. }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("does not exist"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_reference_is_an_error() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n";
        assert!(matches!(
            parse_obj(Cursor::new(src)),
            Err(Error::MalformedMesh { line: 4, .. })
        ));
    }

    #[test]
    fn test_bad_coordinate_is_an_error() {
        let src = "v 0 0 0\nv 1 zero 0\n";
        match parse_obj(Cursor::new(src)) {
            Err(Error::MalformedMesh { line, content, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "v 1 zero 0");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(parse_obj(Cursor::new("v 1 2\n")).is_err());
        assert!(parse_obj(Cursor::new("v 1 nan 2\n")).is_err());
    }

    #[test]
    fn test_short_face_is_an_error() {
        let src = "v 0 0 0\nv 1 0 0\nf 1 2\n";
        assert!(matches!(parse_obj(Cursor::new(src)), Err(Error::MalformedMesh { .. })));
    }

    #[test]
    fn test_unknown_records_are_ignored() -> anyhow::Result<()> {
        let src = "mtllib a.mtl\nv 0 0 0\nvt 0 0\nvn 0 0 1\nv 1 0 0\nv 0 1 0\ns off\ng a\nf 1 2 3\nl 1 2\n";
        let mesh = parse_obj(Cursor::new(src))?;
        assert_eq!(mesh.vertices().len(), 3);
        assert_eq!(mesh.face_count(), 1);
        Ok(())
    }

    #[test]
    fn test_read_obj_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("model.obj");
        let mut f = File::create(&path)?;
        f.write_all(TWO_PARTS.as_bytes())?;
        drop(f);

        let mesh = read_obj(&path)?;
        assert_eq!(mesh.segment_count(), 2);
        assert_eq!(mesh.face_count(), 3);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let res = read_obj(Path::new("does/not/exist.obj"));
        assert!(matches!(res, Err(Error::Io { .. })));
    }
}
