//! Single-page vector PDF output.
//!
//! The surface works in a top-left, y-down user space like the script does:
//! the first operation on the page flips the PDF coordinate system. The
//! surface's translation is added to each point in f64 before the operands are
//! narrowed to PDF reals, so placement does not depend on f32 rounding of
//! large coordinates.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cgmath::Vector2;
use lopdf::{
    content::{Content, Operation},
    dictionary,
    xref::XrefType,
    Document, Object,
};

use crate::config::RenderConfig;
use crate::path::{PathCommand, PathSnapshot, Point};
use crate::signature;

fn real(v: f64) -> Object {
    (v as f32).into()
}

/// A PDF page being drawn. Nothing reaches the disk until [`PdfSurface::finish`].
pub struct PdfSurface {
    path: PathBuf,
    width: f64,
    height: f64,
    title: String,
    offset: Vector2<f64>,
    ops: Vec<Operation>,
}

impl PdfSurface {
    pub fn create(path: &Path, width: f64, height: f64, config: &RenderConfig) -> PdfSurface {
        let ops = vec![Operation::new(
            "cm",
            vec![
                real(1.0),
                real(0.0),
                real(0.0),
                real(-1.0),
                real(0.0),
                real(height),
            ],
        )];
        PdfSurface {
            path: path.to_owned(),
            width,
            height,
            title: config.title.clone(),
            offset: Vector2::new(0.0, 0.0),
            ops,
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Shift everything appended afterwards by (tx, ty).
    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.offset += Vector2::new(tx, ty);
    }

    fn point(&self, p: Point) -> Vec<Object> {
        let p = p + self.offset;
        vec![real(p.x), real(p.y)]
    }

    pub fn append_path(&mut self, path: &PathSnapshot) {
        for cmd in path.commands() {
            let op = match *cmd {
                PathCommand::MoveTo(p) => Operation::new("m", self.point(p)),
                PathCommand::LineTo(p) => Operation::new("l", self.point(p)),
                PathCommand::ClosePath => Operation::new("h", vec![]),
            };
            self.ops.push(op);
        }
    }

    /// Fill with the nonzero winding rule, consuming the path.
    pub fn fill(&mut self) {
        self.ops.push(Operation::new("f", vec![]));
    }

    /// Stroke in black at `width`, consuming the path.
    pub fn stroke(&mut self, width: f64) {
        self.ops.push(Operation::new("w", vec![real(width)]));
        self.ops.push(Operation::new("S", vec![]));
    }

    /// Serialize the page and write it to the surface's path.
    pub fn finish(self) -> Result<()> {
        let bytes = self.to_pdf_bytes()?;
        std::fs::write(&self.path, bytes)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    fn to_pdf_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.4");
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;

        let id_pages = doc.new_object_id();

        let content = Content {
            operations: self.ops.clone(),
        };
        let id_content = doc.add_object(lopdf::Stream::new(
            dictionary! {},
            content.encode().context("encoding page content")?,
        ));
        let id_resources = doc.add_object(dictionary! {});

        let id_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => id_pages,
            "Contents" => id_content,
            "Resources" => id_resources,
            "MediaBox" => vec![0.into(), 0.into(), real(self.width), real(self.height)],
        });

        let kids: Vec<Object> = vec![id_page.into()];
        let pdf_pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i32,
            "Kids" => kids,
        };
        doc.set_object(id_pages, pdf_pages);

        let id_catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => id_pages,
        });
        doc.trailer.set("Root", id_catalog);

        // Metadata
        let date = time::OffsetDateTime::now_utc();
        let s_date = format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}Z",
            date.year(),
            u8::from(date.month()),
            date.day(),
            date.hour(),
            date.minute(),
            date.second(),
        );

        let id_info = doc.add_object(dictionary! {
            "Title" => Object::string_literal(self.title.as_str()),
            "Creator" => Object::string_literal(signature()),
            "CreationDate" => Object::string_literal(s_date.clone()),
            "ModDate" => Object::string_literal(s_date),
        });
        doc.trailer.set("Info", id_info);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).context("serializing PDF")?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathRecorder;
    use cgmath::Point2;

    #[test]
    fn writes_single_page_with_media_box() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("box.pdf");

        let mut rec = PathRecorder::new();
        rec.move_to(Point2::new(0.0, 0.0));
        rec.line_to(Point2::new(30.0, 0.0));

        let mut surface = PdfSurface::create(&out, 40.0, 10.0, &RenderConfig::default());
        surface.translate(5.0, 5.0);
        surface.append_path(&rec.snapshot());
        surface.stroke(2.0);
        surface.finish().unwrap();

        let doc = Document::load(&out).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let media_box: Vec<f32> = page
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect();
        assert_eq!(media_box, vec![0.0, 0.0, 40.0, 10.0]);

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let operators: Vec<&str> = content
            .operations
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        assert_eq!(operators, vec!["cm", "m", "l", "w", "S"]);
        let line: Vec<f32> = content.operations[2]
            .operands
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect();
        assert_eq!(line, vec![35.0, 5.0]);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing-dir").join("x.pdf");
        let surface = PdfSurface::create(&out, 10.0, 10.0, &RenderConfig::default());
        let err = surface.finish().unwrap_err();
        assert!(format!("{err:#}").contains("missing-dir"));
    }
}
