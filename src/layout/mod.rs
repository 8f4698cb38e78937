//! Paginated canvas layout.
//!
//! [`compute_layout`] places every visual element of a [`BuiltModel`] on a
//! stack of fixed-size pages split into three columns:
//! - a cartouche across the top of the first page
//! - theme headers and team boxes, grouped by [`Theme`], each sent to the
//!   currently shortest column
//! - the separate-epics area below all team content
//! - the two alert boxes on a page of their own at the end
//!
//! Blocks never straddle a page boundary unless they are taller than a page.
//! Layout never fails; odd input only produces odd (but valid) geometry.

pub mod columns;
pub mod content;
pub mod text;
pub mod themes;

pub use columns::{COLUMN_COUNT, Columns, PageGeometry};
pub use content::{ContentLine, EpicPlacement, KpiContent, LineKind};
pub use themes::Theme;

use crate::models::{AlertLists, BuiltModel, Epic, Team};
use crate::narrative::{NarrativeMap, TeamNarrative};
use serde::Serialize;
use std::collections::BTreeMap;

/// Box sizes in layout units.
pub mod sizes {
    /// Swimlane title band of a team box
    pub const TEAM_HEADER: i64 = 40;
    /// Side and bottom padding inside a team box
    pub const TEAM_PADDING: i64 = 12;
    /// Gap between stacked boxes inside a team box
    pub const INNER_GAP: i64 = 10;
    pub const MIN_TEAM: i64 = 160;
    pub const MIN_INFO: i64 = 96;
    pub const MIN_MISSION: i64 = 72;
    pub const MIN_KPI: i64 = 96;
    pub const MIN_WARNING: i64 = 30;
    pub const MIN_EPIC: i64 = 60;
    pub const THEME_HEADER: i64 = 36;
    pub const SEPARATE_HEADER: i64 = 40;
    pub const MIN_ALERT: i64 = 72;
}

/// A rectangle in absolute layout units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    /// Whether the vertical spans intersect.
    pub fn overlaps_vertically(&self, other: &Rect) -> bool {
        self.y < other.bottom() && other.y < self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Position relative to `parent`'s top-left corner.
    pub fn relative_to(&self, parent: &Rect) -> Rect {
        Rect::new(self.x - parent.x, self.y - parent.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeHeader {
    pub theme: Theme,
    pub column: usize,
    pub rect: Rect,
}

/// A team box and its nested sub-boxes, all in absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamBoxes {
    pub team_id: i64,
    pub theme: Theme,
    pub column: usize,
    pub rect: Rect,
    pub info: Rect,
    pub mission: Rect,
    pub kpi: Rect,
    pub warning: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpicBox {
    pub team_id: i64,
    pub epic_id: i64,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparateEpicBox {
    pub epic_id: i64,
    pub column: usize,
    pub rect: Rect,
}

/// Placed geometry for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub geometry: PageGeometry,
    pub pages: i64,
    pub cartouche: Rect,
    pub high_fragmentation_box: Option<Rect>,
    pub low_or_unassigned_box: Option<Rect>,
    pub theme_headers: Vec<ThemeHeader>,
    /// Team boxes in placement order
    pub teams: Vec<TeamBoxes>,
    pub epic_boxes: Vec<EpicBox>,
    pub separate_header: Option<Rect>,
    pub separate_epics: Vec<SeparateEpicBox>,
}

impl Layout {
    pub fn team(&self, team_id: i64) -> Option<&TeamBoxes> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn epic_box(&self, team_id: i64, epic_id: i64) -> Option<Rect> {
        self.epic_boxes
            .iter()
            .find(|e| e.team_id == team_id && e.epic_id == epic_id)
            .map(|e| e.rect)
    }

    pub fn separate_epic_box(&self, epic_id: i64) -> Option<Rect> {
        self.separate_epics
            .iter()
            .find(|e| e.epic_id == epic_id)
            .map(|e| e.rect)
    }

    /// Column-flow blocks with the column they occupy.
    ///
    /// Full-width blocks (cartouche, separate header) are reported once per
    /// column. Alert boxes sit on their own page and are not included.
    pub fn column_blocks(&self) -> Vec<(usize, Rect)> {
        let mut blocks = Vec::new();
        for rect in [Some(self.cartouche), self.separate_header].into_iter().flatten() {
            blocks.extend((0..COLUMN_COUNT).map(|column| (column, rect)));
        }
        blocks.extend(self.theme_headers.iter().map(|h| (h.column, h.rect)));
        blocks.extend(self.teams.iter().map(|t| (t.column, t.rect)));
        blocks.extend(self.separate_epics.iter().map(|e| (e.column, e.rect)));
        blocks
    }
}

/// Measured heights of a team box and its children.
#[derive(Debug, Clone, PartialEq)]
struct TeamMeasure {
    height: i64,
    info: i64,
    mission: i64,
    kpi: i64,
    warning: Option<i64>,
    epics: Vec<i64>,
}

fn inner_width(team_width: i64) -> i64 {
    team_width - 2 * sizes::TEAM_PADDING
}

fn lines_height(lines: &[ContentLine], width: i64, min_height: i64) -> i64 {
    text::box_height(&content::plain_lines(lines), width, min_height)
}

/// Height of the KPI box: heading line over two half-width columns.
pub fn kpi_height(kpi: &KpiContent, width: i64) -> i64 {
    let half = width / 2;
    let heading = text::wrapped_line_count(&[kpi.heading.plain()], width) as i64 * text::LINE_HEIGHT;
    let columns = lines_height(&kpi.summary, half, 0).max(lines_height(&kpi.suggestion, half, 0));
    (heading + columns).max(sizes::MIN_KPI)
}

pub fn epic_height(epic: &Epic, placement: EpicPlacement<'_>, width: i64) -> i64 {
    lines_height(&content::epic_lines(epic, placement), width, sizes::MIN_EPIC)
}

fn measure_team(team: &Team, narrative: Option<&TeamNarrative>, width: i64) -> TeamMeasure {
    let inner = inner_width(width);
    let info = lines_height(&content::team_info_lines(team), inner, sizes::MIN_INFO);
    let mission = lines_height(
        &content::team_mission_lines(narrative),
        inner,
        sizes::MIN_MISSION,
    );
    let kpi = kpi_height(&content::team_kpi_content(narrative), inner);
    let warning = content::team_warning_lines(narrative)
        .map(|lines| lines_height(&lines, inner, sizes::MIN_WARNING));
    let epics: Vec<i64> = team
        .epics
        .iter()
        .map(|e| epic_height(e, EpicPlacement::Team(team), inner))
        .collect();

    let mut height = sizes::TEAM_HEADER;
    for h in [Some(info), Some(mission), Some(kpi), warning]
        .into_iter()
        .flatten()
        .chain(epics.iter().copied())
    {
        height += sizes::INNER_GAP + h;
    }
    height += sizes::TEAM_PADDING;

    TeamMeasure {
        height: height.max(sizes::MIN_TEAM),
        info,
        mission,
        kpi,
        warning,
        epics,
    }
}

/// Absolute sub-boxes of a team placed at `rect`.
fn team_boxes(
    team: &Team,
    theme: Theme,
    column: usize,
    rect: Rect,
    measure: &TeamMeasure,
) -> (TeamBoxes, Vec<EpicBox>) {
    let x = rect.x + sizes::TEAM_PADDING;
    let width = inner_width(rect.width);
    let mut y = rect.y + sizes::TEAM_HEADER + sizes::INNER_GAP;
    let mut next = |h: i64| {
        let r = Rect::new(x, y, width, h);
        y += h + sizes::INNER_GAP;
        r
    };

    let info = next(measure.info);
    let mission = next(measure.mission);
    let kpi = next(measure.kpi);
    let warning = measure.warning.map(&mut next);
    let epics = team
        .epics
        .iter()
        .zip(&measure.epics)
        .map(|(epic, h)| EpicBox {
            team_id: team.id,
            epic_id: epic.id,
            rect: next(*h),
        })
        .collect();

    (
        TeamBoxes {
            team_id: team.id,
            theme,
            column,
            rect,
            info,
            mission,
            kpi,
            warning,
        },
        epics,
    )
}

/// A block waiting for a column.
#[derive(Debug, Clone, Copy)]
struct Pending {
    index: usize,
    height: i64,
}

/// Best fit for the space left at `y`: the tallest block that still fits on
/// the page, otherwise the smallest one.
fn pick_best_fit(geometry: &PageGeometry, y: i64, pending: &[Pending]) -> usize {
    let y = geometry.normalize(y);
    let remaining = geometry.body_bottom(geometry.page_of(y)) - y;

    let mut tallest_fit: Option<usize> = None;
    let mut smallest = 0;
    for (i, p) in pending.iter().enumerate() {
        if p.height <= remaining && tallest_fit.is_none_or(|t| p.height > pending[t].height) {
            tallest_fit = Some(i);
        }
        if p.height < pending[smallest].height {
            smallest = i;
        }
    }
    tallest_fit.unwrap_or(smallest)
}

/// Top of a section header and the index of the pending block that goes
/// right below it.
///
/// The header and that block move as one unit, so a header never ends a
/// page. Past the first page, headers only start at a page top. A unit taller
/// than a page body stays where it is.
fn lead_block(geometry: &PageGeometry, y: i64, header: i64, pending: &[Pending]) -> (i64, usize) {
    let mut y = geometry.normalize(y);
    let page = geometry.page_of(y);
    if page > 0 && y > geometry.body_top(page) {
        y = geometry.body_top(page + 1);
    }
    let offset = header + geometry.gap;
    let mut pick = pick_best_fit(geometry, y + offset, pending);
    let top = geometry.place(y, offset + pending[pick].height);
    if top != y {
        y = top;
        pick = pick_best_fit(geometry, y + offset, pending);
    }
    (y, pick)
}

/// Result of placing one theme.
struct ThemePlacement {
    header: ThemeHeader,
    /// (team index, column, rect) in placement order
    teams: Vec<(usize, usize, Rect)>,
    columns: Columns,
}

/// Place a theme header and its teams, returning the new column state.
fn place_theme(
    geometry: &PageGeometry,
    columns: Columns,
    theme: Theme,
    mut pending: Vec<Pending>,
) -> ThemePlacement {
    let width = geometry.column_width();
    let column = columns.shortest();
    let (y, first) = lead_block(geometry, columns.cursor(column), sizes::THEME_HEADER, &pending);
    let header = ThemeHeader {
        theme,
        column,
        rect: Rect::new(geometry.column_x(column), y, width, sizes::THEME_HEADER),
    };
    let lead = pending.remove(first);
    let rect = Rect::new(
        geometry.column_x(column),
        header.rect.bottom() + geometry.gap,
        width,
        lead.height,
    );
    let mut columns = columns.advanced(column, rect.bottom() + geometry.gap);

    let mut teams = Vec::with_capacity(pending.len() + 1);
    teams.push((lead.index, column, rect));
    while !pending.is_empty() {
        let column = columns.shortest();
        let cursor = columns.cursor(column);
        let chosen = pending.remove(pick_best_fit(geometry, cursor, &pending));
        let y = geometry.place(cursor, chosen.height);
        let rect = Rect::new(geometry.column_x(column), y, width, chosen.height);
        columns = columns.advanced(column, rect.bottom() + geometry.gap);
        teams.push((chosen.index, column, rect));
    }

    ThemePlacement {
        header,
        teams,
        columns,
    }
}

/// Place separate epics below `top`, one at a time into the shortest column.
fn place_separate(
    geometry: &PageGeometry,
    top: i64,
    heights: &[i64],
) -> (Rect, Vec<(usize, Rect)>, Columns) {
    let lead = [Pending {
        index: 0,
        height: heights.first().copied().unwrap_or(0),
    }];
    let (y, _) = lead_block(geometry, top, sizes::SEPARATE_HEADER, &lead);
    let header = Rect::new(
        geometry.margin,
        y,
        geometry.content_width(),
        sizes::SEPARATE_HEADER,
    );

    let width = geometry.column_width();
    let mut columns = Columns::starting_at(header.bottom() + geometry.gap);
    let mut placed = Vec::with_capacity(heights.len());
    for (i, h) in heights.iter().enumerate() {
        let column = columns.shortest();
        let cursor = columns.cursor(column);
        // the first epic already moved with the header
        let y = if i == 0 { cursor } else { geometry.place(cursor, *h) };
        let rect = Rect::new(geometry.column_x(column), y, width, *h);
        columns = columns.advanced(column, rect.bottom() + geometry.gap);
        placed.push((column, rect));
    }
    (header, placed, columns)
}

/// Two side-by-side alert boxes on a page after `content_bottom`.
fn place_alerts(geometry: &PageGeometry, content_bottom: i64, alerts: &AlertLists) -> (Rect, Rect) {
    let half = (geometry.content_width() - geometry.gap) / 2;
    let left = content::alert_lines(content::HIGH_FRAGMENTATION_TITLE, &alerts.high_fragmentation);
    let right = content::alert_lines(content::LOW_ASSIGNMENT_TITLE, &alerts.low_or_unassigned);
    let height = lines_height(&left, half, sizes::MIN_ALERT).max(lines_height(
        &right,
        half,
        sizes::MIN_ALERT,
    ));

    let page = geometry.page_of((content_bottom - 1).max(0)) + 1;
    let y = geometry.body_top(page);
    (
        Rect::new(geometry.margin, y, half, height),
        Rect::new(geometry.margin + half + geometry.gap, y, half, height),
    )
}

/// Lay out a model on the default page geometry.
pub fn compute_layout(
    model: &BuiltModel,
    narratives: &NarrativeMap,
    alerts: Option<&AlertLists>,
) -> Layout {
    compute_layout_with(PageGeometry::default(), model, narratives, alerts)
}

/// Lay out a model on the given page geometry.
pub fn compute_layout_with(
    geometry: PageGeometry,
    model: &BuiltModel,
    narratives: &NarrativeMap,
    alerts: Option<&AlertLists>,
) -> Layout {
    let cartouche = Rect::new(
        geometry.margin,
        geometry.margin,
        geometry.content_width(),
        geometry.cartouche_height,
    );
    let width = geometry.column_width();

    let measures: Vec<TeamMeasure> = model
        .teams
        .iter()
        .map(|t| measure_team(t, narratives.get(&t.id), width))
        .collect();

    let mut by_theme: BTreeMap<Theme, Vec<Pending>> = BTreeMap::new();
    for (index, team) in model.teams.iter().enumerate() {
        by_theme
            .entry(Theme::classify(&team.name))
            .or_default()
            .push(Pending {
                index,
                height: measures[index].height,
            });
    }

    let mut columns = Columns::starting_at(geometry.body_top(0));
    let mut theme_headers = Vec::new();
    let mut teams = Vec::with_capacity(model.teams.len());
    let mut epic_boxes = Vec::new();
    for theme in Theme::ORDER {
        let Some(pending) = by_theme.remove(&theme) else {
            continue;
        };
        let placed = place_theme(&geometry, columns, theme, pending);
        columns = placed.columns;
        theme_headers.push(placed.header);
        for (index, column, rect) in placed.teams {
            let (boxes, epics) = team_boxes(&model.teams[index], theme, column, rect, &measures[index]);
            teams.push(boxes);
            epic_boxes.extend(epics);
        }
    }

    let mut content_bottom = columns.max_bottom();
    let mut separate_header = None;
    let mut separate_epics = Vec::new();
    if !model.separate_epics.is_empty() {
        let heights: Vec<i64> = model
            .separate_epics
            .iter()
            .map(|e| epic_height(e, EpicPlacement::Separate, width))
            .collect();
        let (header, placed, after) = place_separate(&geometry, content_bottom, &heights);
        separate_header = Some(header);
        separate_epics = model
            .separate_epics
            .iter()
            .zip(placed)
            .map(|(epic, (column, rect))| SeparateEpicBox {
                epic_id: epic.id,
                column,
                rect,
            })
            .collect();
        content_bottom = after.max_bottom();
    }

    let (high_fragmentation_box, low_or_unassigned_box) = match alerts {
        Some(lists) if !lists.is_empty() => {
            let (left, right) = place_alerts(&geometry, content_bottom, lists);
            (Some(left), Some(right))
        }
        _ => (None, None),
    };

    let mut layout = Layout {
        geometry,
        pages: 1,
        cartouche,
        high_fragmentation_box,
        low_or_unassigned_box,
        theme_headers,
        teams,
        epic_boxes,
        separate_header,
        separate_epics,
    };
    let bottom = layout
        .column_blocks()
        .iter()
        .map(|(_, r)| *r)
        .chain(layout.high_fragmentation_box)
        .chain(layout.low_or_unassigned_box)
        .map(|r| r.bottom())
        .max()
        .unwrap_or(0);
    layout.pages = geometry.pages_for(bottom);

    tracing::debug!(
        pages = layout.pages,
        teams = layout.teams.len(),
        separate = layout.separate_epics.len(),
        "layout computed"
    );
    layout
}
