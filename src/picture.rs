//! Picture (§4.3): typed vector-drawing primitives, raster bitmaps, and
//! opaque OLE-embedded graphics, plus the `S`/`E`/`T` tag-stream codec used
//! to ship a vector drawing to the back-end as an ODG fragment (§6.2).
//!
//! Grounded on `examples/original_source/src/lib/TMWAWPictBasic.{hxx,cxx}`
//! (the five basic shapes, their style/bbox bookkeeping) and
//! `TMWAWPropertyHandler.{hxx,cxx}` (the encoder/decoder shape for the tag
//! stream). The original codes integers in host byte order; this crate
//! standardizes on little-endian for the fragment format, the same design
//! choice `Stream` makes for everything else it reads or writes.

use crate::error::{MwawError, Result};
use crate::types::{Box2, Color, Vec2};

// ---------------------------------------------------------------------
// §6.2 fragment codec
// ---------------------------------------------------------------------

pub mod fragment {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum FragmentEvent {
        Start {
            name: String,
            properties: Vec<(String, String)>,
        },
        End {
            name: String,
        },
        Text(String),
    }

    /// Builds an `S`/`E`/`T` tag stream incrementally, mirroring
    /// `TMWAWPropertyHandlerEncoder`'s `startElement`/`endElement`/
    /// `characters` calls.
    pub struct FragmentEncoder {
        buf: Vec<u8>,
    }

    impl FragmentEncoder {
        pub fn new() -> Self {
            FragmentEncoder { buf: Vec::new() }
        }

        fn write_i32(&mut self, v: i32) {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }

        fn write_string(&mut self, s: &str) {
            self.write_i32(s.len() as i32);
            self.buf.extend_from_slice(s.as_bytes());
        }

        pub fn start_element(&mut self, name: &str, properties: &[(&str, &str)]) {
            self.buf.push(b'S');
            self.write_string(name);
            self.write_i32(properties.len() as i32);
            for (key, value) in properties {
                self.write_string(key);
                self.write_string(value);
            }
        }

        pub fn end_element(&mut self, name: &str) {
            self.buf.push(b'E');
            self.write_string(name);
        }

        /// A no-op on empty text, matching the original's early return.
        pub fn characters(&mut self, text: &str) {
            if text.is_empty() {
                return;
            }
            self.buf.push(b'T');
            self.write_string(text);
        }

        pub fn into_bytes(self) -> Vec<u8> {
            self.buf
        }
    }

    impl Default for FragmentEncoder {
        fn default() -> Self {
            FragmentEncoder::new()
        }
    }

    fn read_i32(bytes: &[u8], pos: &mut usize) -> Result<i32> {
        if *pos + 4 > bytes.len() {
            return Err(MwawError::truncated("fragment integer"));
        }
        let v = i32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
        *pos += 4;
        Ok(v)
    }

    fn read_string(bytes: &[u8], pos: &mut usize) -> Result<String> {
        let len = read_i32(bytes, pos)?;
        if len < 0 {
            return Err(MwawError::malformed_zone("negative fragment string length"));
        }
        let len = len as usize;
        if *pos + len > bytes.len() {
            return Err(MwawError::truncated("fragment string"));
        }
        let s = String::from_utf8_lossy(&bytes[*pos..*pos + len]).into_owned();
        *pos += len;
        Ok(s)
    }

    /// Decodes a tag stream into its event sequence, validating that every
    /// `S` is matched by an `E` with the same name in LIFO order (§8's
    /// tested property) rather than silently accepting mismatched nesting.
    pub fn decode(bytes: &[u8]) -> Result<Vec<FragmentEvent>> {
        let mut pos = 0usize;
        let mut events = Vec::new();
        let mut open: Vec<String> = Vec::new();
        while pos < bytes.len() {
            let marker = bytes[pos];
            pos += 1;
            match marker {
                b'S' => {
                    let name = read_string(bytes, &mut pos)?;
                    let count = read_i32(bytes, &mut pos)?;
                    if count < 0 {
                        return Err(MwawError::malformed_zone("negative property count"));
                    }
                    let mut properties = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let key = read_string(bytes, &mut pos)?;
                        let value = read_string(bytes, &mut pos)?;
                        properties.push((key, value));
                    }
                    open.push(name.clone());
                    events.push(FragmentEvent::Start { name, properties });
                }
                b'E' => {
                    let name = read_string(bytes, &mut pos)?;
                    match open.pop() {
                        Some(ref top) if *top == name => {}
                        Some(top) => {
                            return Err(MwawError::malformed_zone(format!(
                                "end tag {name} does not match open tag {top}"
                            )))
                        }
                        None => {
                            return Err(MwawError::malformed_zone(format!(
                                "end tag {name} with no open element"
                            )))
                        }
                    }
                    events.push(FragmentEvent::End { name });
                }
                b'T' => {
                    let text = read_string(bytes, &mut pos)?;
                    if !text.is_empty() {
                        events.push(FragmentEvent::Text(text));
                    }
                }
                other => {
                    return Err(MwawError::malformed_zone(format!(
                        "unknown fragment marker '{}'",
                        other as char
                    )))
                }
            }
        }
        if !open.is_empty() {
            return Err(MwawError::malformed_zone(
                "fragment ends with unclosed elements",
            ));
        }
        Ok(events)
    }
}

use fragment::FragmentEncoder;

fn pt(v: f64) -> String {
    format!("{v}pt")
}

fn hex_color(c: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b)
}

// ---------------------------------------------------------------------
// §4.3 Basic
// ---------------------------------------------------------------------

/// Shared styling and bounding-box-extension bookkeeping for every
/// [`PictBasic`] shape, mirroring `PictBasic`'s private fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeStyle {
    pub line_width: f64,
    pub line_color: Color,
    pub surface_color: Color,
    pub surface_has_color: bool,
    /// `extend[0]` derives from `line_width`; `extend[1]` from arrow markers.
    extend: [f64; 2],
}

impl Default for ShapeStyle {
    fn default() -> Self {
        let mut style = ShapeStyle {
            line_width: 0.0,
            line_color: Color::BLACK,
            surface_color: Color::new(255, 255, 255),
            surface_has_color: false,
            extend: [0.0, 0.0],
        };
        style.set_line_width(1.0);
        style
    }
}

impl ShapeStyle {
    pub fn set_line_width(&mut self, width: f64) {
        self.line_width = width;
        self.extend[0] = width;
    }

    /// An endpoint arrow extends the bounding box by a fixed 5pt, same
    /// constant `PictLine::setArrow` uses.
    pub fn set_has_arrow(&mut self, has_arrow: bool) {
        self.extend[1] = if has_arrow { 5.0 } else { 0.0 };
    }

    fn total_extend(&self) -> f64 {
        self.extend[0] + self.extend[1]
    }

    fn graphic_style_properties(&self, start_arrow: bool, end_arrow: bool) -> Vec<(&'static str, String)> {
        vec![
            ("lineColor", hex_color(self.line_color)),
            ("lineWidth", pt(self.line_width)),
            (
                "lineFill",
                (if self.line_width > 0.0 { "solid" } else { "none" }).to_string(),
            ),
            ("surfaceColor", hex_color(self.surface_color)),
            (
                "surfaceFill",
                (if self.surface_has_color { "solid" } else { "none" }).to_string(),
            ),
            ("startArrow", start_arrow.to_string()),
            ("endArrow", end_arrow.to_string()),
        ]
    }
}

fn bbox_with_extend(base: Box2<f64>, extend: f64) -> Box2<f64> {
    base.extend(Vec2::new(2.0 * extend, 2.0 * extend))
}

fn write_preamble(enc: &mut FragmentEncoder, bbox: Box2<f64>) {
    let w = bbox.width();
    let h = bbox.height();
    enc.start_element(
        "libmwaw:document",
        &[("w", &pt(w)), ("h", &pt(h))],
    );
}

fn write_graphic_style(enc: &mut FragmentEncoder, style: &ShapeStyle, start_arrow: bool, end_arrow: bool) {
    let props = style.graphic_style_properties(start_arrow, end_arrow);
    let refs: Vec<(&str, &str)> = props.iter().map(|(k, v)| (*k, v.as_str())).collect();
    enc.start_element("libmwaw:graphicStyle", &refs);
    enc.end_element("libmwaw:graphicStyle");
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub style: ShapeStyle,
    pub extremity: [Vec2<f64>; 2],
    pub arrows: [bool; 2],
}

impl Line {
    pub fn new(orig: Vec2<f64>, end: Vec2<f64>) -> Self {
        Line {
            style: ShapeStyle::default(),
            extremity: [orig, end],
            arrows: [false, false],
        }
    }

    pub fn set_arrow(&mut self, index: usize, value: bool) {
        self.arrows[index] = value;
        self.style.set_has_arrow(self.arrows[0] || self.arrows[1]);
    }

    fn base_bbox(&self) -> Box2<f64> {
        Box2::new(self.extremity[0], self.extremity[1])
    }

    pub fn bounding_box(&self) -> Box2<f64> {
        bbox_with_extend(self.base_bbox(), self.style.total_extend())
    }

    pub fn to_fragment(&self) -> Vec<u8> {
        let mut enc = FragmentEncoder::new();
        write_preamble(&mut enc, self.bounding_box());
        write_graphic_style(&mut enc, &self.style, self.arrows[0], self.arrows[1]);
        enc.start_element(
            "libmwaw:drawLine",
            &[
                ("x0", &pt(self.extremity[0].x)),
                ("y0", &pt(self.extremity[0].y)),
                ("x1", &pt(self.extremity[1].x)),
                ("y1", &pt(self.extremity[1].y)),
            ],
        );
        enc.end_element("libmwaw:drawLine");
        enc.end_element("libmwaw:document");
        enc.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rectangle {
    pub style: ShapeStyle,
    pub bbox: Box2<f64>,
    pub corner: [f64; 2],
}

impl Rectangle {
    pub fn new(bbox: Box2<f64>) -> Self {
        Rectangle {
            style: ShapeStyle::default(),
            bbox,
            corner: [0.0, 0.0],
        }
    }

    pub fn set_round_corner(&mut self, xw: f64, yw: f64) {
        self.corner = [xw, yw];
    }

    pub fn bounding_box(&self) -> Box2<f64> {
        bbox_with_extend(self.bbox, self.style.total_extend())
    }

    pub fn to_fragment(&self) -> Vec<u8> {
        let mut enc = FragmentEncoder::new();
        write_preamble(&mut enc, self.bounding_box());
        write_graphic_style(&mut enc, &self.style, false, false);
        let mut props = vec![
            ("x0".to_string(), pt(self.bbox.min().x)),
            ("y0".to_string(), pt(self.bbox.min().y)),
            ("w".to_string(), pt(self.bbox.width())),
            ("h".to_string(), pt(self.bbox.height())),
        ];
        if self.corner != [0.0, 0.0] {
            props.push(("rw".to_string(), pt(self.corner[0])));
            props.push(("rh".to_string(), pt(self.corner[1])));
        }
        let refs: Vec<(&str, &str)> = props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        enc.start_element("libmwaw:drawRectangle", &refs);
        enc.end_element("libmwaw:drawRectangle");
        enc.end_element("libmwaw:document");
        enc.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub style: ShapeStyle,
    pub bbox: Box2<f64>,
}

impl Circle {
    pub fn new(bbox: Box2<f64>) -> Self {
        Circle {
            style: ShapeStyle::default(),
            bbox,
        }
    }

    pub fn bounding_box(&self) -> Box2<f64> {
        bbox_with_extend(self.bbox, self.style.total_extend())
    }

    pub fn to_fragment(&self) -> Vec<u8> {
        let mut enc = FragmentEncoder::new();
        write_preamble(&mut enc, self.bounding_box());
        write_graphic_style(&mut enc, &self.style, false, false);
        enc.start_element(
            "libmwaw:drawCircle",
            &[
                ("x0", &pt(self.bbox.min().x)),
                ("y0", &pt(self.bbox.min().y)),
                ("w", &pt(self.bbox.width())),
                ("h", &pt(self.bbox.height())),
            ],
        );
        enc.end_element("libmwaw:drawCircle");
        enc.end_element("libmwaw:document");
        enc.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub style: ShapeStyle,
    pub bbox: Box2<f64>,
    pub ellipse_box: Box2<f64>,
    pub angles: [f64; 2],
}

impl Arc {
    pub fn new(bbox: Box2<f64>, ellipse_box: Box2<f64>, start_angle: f64, sweep_angle: f64) -> Self {
        Arc {
            style: ShapeStyle::default(),
            bbox,
            ellipse_box,
            angles: [start_angle, sweep_angle],
        }
    }

    pub fn bounding_box(&self) -> Box2<f64> {
        bbox_with_extend(self.bbox, self.style.total_extend())
    }

    pub fn to_fragment(&self) -> Vec<u8> {
        let mut enc = FragmentEncoder::new();
        write_preamble(&mut enc, self.bounding_box());
        write_graphic_style(&mut enc, &self.style, false, false);
        enc.start_element(
            "libmwaw:drawArc",
            &[
                ("x0", &pt(self.ellipse_box.min().x)),
                ("y0", &pt(self.ellipse_box.min().y)),
                ("w", &pt(self.ellipse_box.width())),
                ("h", &pt(self.ellipse_box.height())),
                ("angle0", &self.angles[0].to_string()),
                ("angle1", &self.angles[1].to_string()),
            ],
        );
        enc.end_element("libmwaw:drawArc");
        enc.end_element("libmwaw:document");
        enc.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub style: ShapeStyle,
    pub bbox: Box2<f64>,
    pub vertices: Vec<Vec2<f64>>,
}

impl Polygon {
    pub fn new(bbox: Box2<f64>, vertices: Vec<Vec2<f64>>) -> Self {
        Polygon {
            style: ShapeStyle::default(),
            bbox,
            vertices,
        }
    }

    pub fn bounding_box(&self) -> Box2<f64> {
        bbox_with_extend(self.bbox, self.style.total_extend())
    }

    pub fn to_fragment(&self) -> Vec<u8> {
        let mut enc = FragmentEncoder::new();
        write_preamble(&mut enc, self.bounding_box());
        write_graphic_style(&mut enc, &self.style, false, false);
        let mut props = Vec::with_capacity(self.vertices.len() * 2 + 2);
        for (i, v) in self.vertices.iter().enumerate() {
            props.push((format!("x{i}"), pt(v.x)));
            props.push((format!("y{i}"), pt(v.y)));
        }
        props.push(("w".to_string(), pt(self.bbox.width())));
        props.push(("h".to_string(), pt(self.bbox.height())));
        let refs: Vec<(&str, &str)> = props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        enc.start_element("libmwaw:drawPolygon", &refs);
        enc.end_element("libmwaw:drawPolygon");
        enc.end_element("libmwaw:document");
        enc.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PictBasic {
    Line(Line),
    Rectangle(Rectangle),
    Circle(Circle),
    Arc(Arc),
    Polygon(Polygon),
}

impl PictBasic {
    pub fn bounding_box(&self) -> Box2<f64> {
        match self {
            PictBasic::Line(l) => l.bounding_box(),
            PictBasic::Rectangle(r) => r.bounding_box(),
            PictBasic::Circle(c) => c.bounding_box(),
            PictBasic::Arc(a) => a.bounding_box(),
            PictBasic::Polygon(p) => p.bounding_box(),
        }
    }

    pub fn to_odg_fragment(&self) -> Vec<u8> {
        match self {
            PictBasic::Line(l) => l.to_fragment(),
            PictBasic::Rectangle(r) => r.to_fragment(),
            PictBasic::Circle(c) => c.to_fragment(),
            PictBasic::Arc(a) => a.to_fragment(),
            PictBasic::Polygon(p) => p.to_fragment(),
        }
    }
}

// ---------------------------------------------------------------------
// §4.3 Bitmap
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bitonal,
    Indexed,
    Rgb24,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Row-major pixel data: packed 1bpp (row-padded to a byte) for
    /// `Bitonal`, one palette index per pixel for `Indexed`, 3
    /// interleaved bytes per pixel for `Rgb24`.
    pub data: Vec<u8>,
    pub palette: Vec<Color>,
}

impl Bitmap {
    /// Emits a binary PBM (`P4`) for 1-bit data, or a binary PPM (`P6`)
    /// for indexed (resolved through `palette`) or true-color data (§4.3).
    pub fn as_pnm(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Bitonal => {
                let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
                out.extend_from_slice(&self.data);
                out
            }
            PixelFormat::Indexed => {
                let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
                for &index in &self.data {
                    let color = self.palette.get(index as usize).copied().unwrap_or(Color::BLACK);
                    out.push(color.r);
                    out.push(color.g);
                    out.push(color.b);
                }
                out
            }
            PixelFormat::Rgb24 => {
                let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
                out.extend_from_slice(&self.data);
                out
            }
        }
    }
}

// ---------------------------------------------------------------------
// §4.3 OleContainer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OleContainer {
    pub bbox: Box2<f64>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Picture {
    Basic(PictBasic),
    Bitmap(Bitmap),
    OleContainer(OleContainer),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragment::{decode, FragmentEvent};

    #[test]
    fn line_fragment_round_trips_through_decoder() {
        let line = Line::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 20.0));
        let bytes = PictBasic::Line(line).to_odg_fragment();
        let events = decode(&bytes).unwrap();
        assert!(matches!(&events[0], FragmentEvent::Start { name, .. } if name == "libmwaw:document"));
        assert!(matches!(events.last().unwrap(), FragmentEvent::End { name } if name == "libmwaw:document"));
    }

    #[test]
    fn mismatched_end_tag_is_rejected() {
        let mut enc = FragmentEncoder::new();
        enc.start_element("a", &[]);
        enc.end_element("b");
        let err = decode(&enc.into_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn unclosed_element_is_rejected() {
        let mut enc = FragmentEncoder::new();
        enc.start_element("a", &[]);
        let err = decode(&enc.into_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn properties_round_trip() {
        let mut enc = FragmentEncoder::new();
        enc.start_element("a", &[("k", "v")]);
        enc.characters("hi");
        enc.end_element("a");
        let events = decode(&enc.into_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                FragmentEvent::Start {
                    name: "a".to_string(),
                    properties: vec![("k".to_string(), "v".to_string())],
                },
                FragmentEvent::Text("hi".to_string()),
                FragmentEvent::End { name: "a".to_string() },
            ]
        );
    }

    #[test]
    fn bitonal_bitmap_emits_p4_header() {
        let bmp = Bitmap {
            width: 8,
            height: 1,
            format: PixelFormat::Bitonal,
            data: vec![0xFF],
            palette: Vec::new(),
        };
        let pnm = bmp.as_pnm();
        assert!(pnm.starts_with(b"P4\n8 1\n"));
    }

    #[test]
    fn indexed_bitmap_resolves_through_palette() {
        let bmp = Bitmap {
            width: 1,
            height: 1,
            format: PixelFormat::Indexed,
            data: vec![0],
            palette: vec![Color::new(1, 2, 3)],
        };
        let pnm = bmp.as_pnm();
        assert!(pnm.ends_with(&[1, 2, 3]));
    }

    #[test]
    fn line_bounding_box_grows_with_arrow() {
        let mut line = Line::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let without_arrow = line.bounding_box();
        line.set_arrow(0, true);
        let with_arrow = line.bounding_box();
        assert!(with_arrow.width() > without_arrow.width());
    }
}
