//! diagrams.net (`.drawio`) writer.
//!
//! Produces an uncompressed `mxfile`. Cells nested in a team swimlane carry
//! coordinates relative to the team; everything else is absolute. Labels are
//! HTML (`html=1`) built from the same content lines the layout measured.

use crate::layout::content::{self, ContentLine, EpicPlacement, KpiContent, LineKind};
use crate::layout::{Layout, Rect};
use crate::models::{AlertLists, BuiltModel};
use crate::narrative::NarrativeMap;
use std::fmt::Write;

/// Cell styles.
mod styles {
    const BOX: &str = "rounded=1;arcSize=6;absoluteArcSize=1;whiteSpace=wrap;html=1;";
    const TEXT_BOX: &str = "align=left;verticalAlign=top;spacing=6;spacingLeft=12;spacingRight=10;";

    pub fn cartouche() -> String {
        format!("{BOX}align=center;verticalAlign=middle;fontSize=18;fontStyle=1;fillColor=#f5f5f5;strokeColor=#999999;spacingLeft=10;spacingRight=10;")
    }

    pub fn alert_high() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=12;fillColor=#fde2e2;strokeColor=#c0392b;")
    }

    pub fn alert_low() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=12;fillColor=#fff3cd;strokeColor=#d6b656;")
    }

    pub fn theme_header() -> String {
        format!("{BOX}align=center;verticalAlign=middle;fontSize=13;fontStyle=1;fillColor=#e9ecef;strokeColor=#adb5bd;")
    }

    pub fn team() -> String {
        format!("swimlane;{BOX}startSize=40;fillColor=#ffffff;strokeColor=#666666;fontSize=14;spacingLeft=10;spacingRight=8;")
    }

    pub fn team_info() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=11;fillColor=#f8f9fa;strokeColor=#b0b0b0;")
    }

    pub fn team_mission() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=11;fillColor=#eef6ff;strokeColor=#7ea6d8;")
    }

    pub fn team_kpi() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=11;fillColor=#eaf7ea;strokeColor=#6aa84f;")
    }

    pub fn team_warning() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=10;fontColor=#4a4a4a;fillColor=#f2f2f2;strokeColor=#c7c7c7;")
    }

    pub fn epic() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=12;fillColor=#dae8fc;strokeColor=#6c8ebf;")
    }

    pub fn separate_epic() -> String {
        format!("{BOX}{TEXT_BOX}fontSize=12;fillColor=#fff2cc;strokeColor=#d6b656;")
    }

    pub fn separate_header() -> String {
        format!("{BOX}align=left;verticalAlign=middle;fontSize=14;fontStyle=1;spacingLeft=12;spacingRight=10;fillColor=#fff2cc;strokeColor=#d6b656;")
    }
}

const HEADING_COLOR: &str = "#1f4e79";
const MUTED_COLOR: &str = "#555555";

/// Escape text placed inside an HTML label.
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape a value placed inside an XML attribute.
pub fn xml_attr_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#xa;"),
            other => out.push(other),
        }
    }
    out
}

fn multiline(text: &str) -> String {
    html_escape(text).replace('\n', "<br/>")
}

fn line_html(line: &ContentLine) -> String {
    match line.kind {
        LineKind::Title => format!(
            "<div style=\"text-align:center;\"><b>{}</b></div>",
            multiline(&line.text)
        ),
        LineKind::Heading => format!(
            "<div style=\"text-align:center;color:{};\"><b>{}</b></div>",
            HEADING_COLOR,
            multiline(&line.text)
        ),
        LineKind::Field => format!("<b>{} :</b> {}", html_escape(&line.label), multiline(&line.text)),
        LineKind::Body => multiline(&line.text),
        LineKind::Muted => format!(
            "<span style=\"color:{};\">{}</span>",
            MUTED_COLOR,
            multiline(&line.text)
        ),
        LineKind::Separator => "<hr/>".to_string(),
        LineKind::Blank => String::new(),
    }
}

/// HTML label for a list of content lines.
pub fn lines_html(lines: &[ContentLine]) -> String {
    lines.iter().map(line_html).collect::<Vec<_>>().join("<br/>")
}

fn kpi_html(kpi: &KpiContent) -> String {
    format!(
        "{}<table style=\"width:100%; border-collapse:collapse; margin-top:6px;\" cellspacing=\"0\" cellpadding=\"0\"><tr>\
<td style=\"width:50%; vertical-align:top; border-right:1px solid #a5d6a7; padding-right:8px;\">{}</td>\
<td style=\"width:50%; vertical-align:top; padding-left:8px;\">{}</td></tr></table>",
        line_html(&kpi.heading),
        lines_html(&kpi.summary),
        lines_html(&kpi.suggestion)
    )
}

/// Accumulates `mxCell` elements with sequential ids.
struct CellWriter {
    out: String,
    next_id: usize,
}

impl CellWriter {
    fn new() -> Self {
        let mut out = String::new();
        out.push_str("<mxCell id=\"0\"/>");
        out.push_str("<mxCell id=\"1\" parent=\"0\"/>");
        Self { out, next_id: 2 }
    }

    /// Append a vertex and return its id.
    fn vertex(&mut self, value: &str, style: &str, parent: &str, rect: Rect) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        // writing into a String cannot fail
        let _ = write!(
            self.out,
            "<mxCell id=\"{}\" value=\"{}\" style=\"{}\" vertex=\"1\" parent=\"{}\">\
<mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\"/></mxCell>",
            id,
            xml_attr_escape(value),
            xml_attr_escape(style),
            parent,
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        id
    }
}

/// Render the whole diagram.
pub fn render_drawio(
    model: &BuiltModel,
    layout: &Layout,
    narratives: &NarrativeMap,
    alerts: Option<&AlertLists>,
) -> String {
    let mut cells = CellWriter::new();
    let page = &layout.geometry;

    cells.vertex(
        &lines_html(&content::cartouche_lines(&model.period)),
        &styles::cartouche(),
        "1",
        layout.cartouche,
    );

    let empty = AlertLists::default();
    let alerts = alerts.unwrap_or(&empty);
    if let Some(rect) = layout.high_fragmentation_box {
        let lines = content::alert_lines(content::HIGH_FRAGMENTATION_TITLE, &alerts.high_fragmentation);
        cells.vertex(&lines_html(&lines), &styles::alert_high(), "1", rect);
    }
    if let Some(rect) = layout.low_or_unassigned_box {
        let lines = content::alert_lines(content::LOW_ASSIGNMENT_TITLE, &alerts.low_or_unassigned);
        cells.vertex(&lines_html(&lines), &styles::alert_low(), "1", rect);
    }

    for header in &layout.theme_headers {
        cells.vertex(
            &lines_html(&content::theme_header_lines(header.theme.title())),
            &styles::theme_header(),
            "1",
            header.rect,
        );
    }

    for boxes in &layout.teams {
        let Some(team) = model.team(boxes.team_id) else {
            continue;
        };
        let narrative = narratives.get(&team.id);
        let parent = cells.vertex(&html_escape(&team.name), &styles::team(), "1", boxes.rect);
        let rel = |r: Rect| r.relative_to(&boxes.rect);

        cells.vertex(
            &lines_html(&content::team_info_lines(team)),
            &styles::team_info(),
            &parent,
            rel(boxes.info),
        );
        cells.vertex(
            &lines_html(&content::team_mission_lines(narrative)),
            &styles::team_mission(),
            &parent,
            rel(boxes.mission),
        );
        cells.vertex(
            &kpi_html(&content::team_kpi_content(narrative)),
            &styles::team_kpi(),
            &parent,
            rel(boxes.kpi),
        );
        if let (Some(rect), Some(lines)) = (boxes.warning, content::team_warning_lines(narrative)) {
            cells.vertex(&lines_html(&lines), &styles::team_warning(), &parent, rel(rect));
        }
        for epic in &team.epics {
            if let Some(rect) = layout.epic_box(team.id, epic.id) {
                cells.vertex(
                    &lines_html(&content::epic_lines(epic, EpicPlacement::Team(team))),
                    &styles::epic(),
                    &parent,
                    rel(rect),
                );
            }
        }
    }

    if let Some(rect) = layout.separate_header {
        cells.vertex(
            &lines_html(&content::separate_header_lines()),
            &styles::separate_header(),
            "1",
            rect,
        );
    }
    for epic in &model.separate_epics {
        if let Some(rect) = layout.separate_epic_box(epic.id) {
            cells.vertex(
                &lines_html(&content::epic_lines(epic, EpicPlacement::Separate)),
                &styles::separate_epic(),
                "1",
                rect,
            );
        }
    }

    format!(
        "<mxfile host=\"app.diagrams.net\" compressed=\"false\"><diagram name=\"{name}\">\
<mxGraphModel dx=\"{w}\" dy=\"{h}\" grid=\"1\" gridSize=\"10\" guides=\"1\" tooltips=\"1\" connect=\"1\" arrows=\"1\" \
fold=\"1\" page=\"1\" pageScale=\"1\" pageWidth=\"{w}\" pageHeight=\"{h}\" math=\"0\" shadow=\"0\"><root>{cells}</root>\
</mxGraphModel></diagram></mxfile>\n",
        name = xml_attr_escape(&format!("PI Planning {}", model.period)),
        w = page.width,
        h = page.height,
        cells = cells.out
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mapping;
    use crate::layout::compute_layout;
    use crate::models::build_model;
    use crate::narrative::local_narratives;
    use crate::source::demo::demo_tables;

    fn demo_diagram(alerts: Option<&AlertLists>) -> String {
        let mapping = Mapping::embedded().unwrap();
        let model = build_model(&demo_tables(&mapping), &mapping, "PI-10").unwrap();
        let narratives = local_narratives(&model);
        let layout = compute_layout(&model, &narratives, alerts);
        render_drawio(&model, &layout, &narratives, alerts)
    }

    #[test]
    fn test_escaping() {
        assert_eq!(html_escape("R&D <x>"), "R&amp;D &lt;x&gt;");
        assert_eq!(xml_attr_escape("a\"b\nc"), "a&quot;b&#xa;c");
    }

    #[test]
    fn test_lines_html() {
        let html = lines_html(&[
            ContentLine::field("PM", "Alice"),
            ContentLine::muted("Bob – DEV – 5%"),
            ContentLine::body("a\nb"),
        ]);
        assert_eq!(
            html,
            "<b>PM :</b> Alice<br/><span style=\"color:#555555;\">Bob – DEV – 5%</span><br/>a<br/>b"
        );
    }

    #[test]
    fn test_demo_diagram_structure() {
        let xml = demo_diagram(None);
        assert!(xml.starts_with("<mxfile host=\"app.diagrams.net\" compressed=\"false\">"));
        assert!(xml.contains("pageWidth=\"1654\" pageHeight=\"1169\""));
        assert!(xml.contains("value=\"Team Alpha\""));
        assert!(xml.contains("Epic S\u{e9}curit\u{e9} &amp;amp; Conformit\u{e9}"));
        // three team swimlanes
        assert_eq!(xml.matches("swimlane;").count(), 3);
        // one separate epic cell plus the separate header share the yellow fill
        assert_eq!(xml.matches("fillColor=#fff2cc;").count(), 2);
        assert!(!xml.contains("fillColor=#fde2e2"));
    }

    #[test]
    fn test_children_use_team_relative_coordinates() {
        let xml = demo_diagram(None);
        // ids: 2 cartouche, 3 theme header, 4 first team
        assert!(xml.contains("parent=\"4\"><mxGeometry x=\"12\" y=\"50\""));
    }

    #[test]
    fn test_alert_cells() {
        let alerts = AlertLists {
            high_fragmentation: vec!["Bob Dupont [3 EPICs] (A, B, C)".to_string()],
            low_or_unassigned: vec![],
        };
        let xml = demo_diagram(Some(&alerts));
        assert!(xml.contains("fillColor=#fde2e2"));
        assert!(xml.contains("fillColor=#fff3cd"));
        assert!(xml.contains("- Bob Dupont [3 EPICs] (A, B, C)"));
        assert!(xml.contains("- aucun"));
    }
}
