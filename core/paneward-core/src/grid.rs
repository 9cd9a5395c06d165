//! Grid layout translation.
//!
//! Pure functions between three views of an editor grid:
//!
//! - the host's layout tree ([`GridLayout`], alternating orientation),
//! - its shape ([`GridSize`], rows x cols),
//! - the split/focus commands that build that shape on a blank canvas
//!   ([`split_plan`]).
//!
//! Only uniform rectangular grids are modelled. A tree whose rows have
//! differing column counts is measured by its first row/column and is
//! otherwise undefined.
//!
//! # Why columns first
//!
//! Splitting right on a multi-row group makes the host split every row at
//! once, so [`split_plan`] establishes all columns before subdividing each
//! one into rows.

use serde::{Deserialize, Serialize};

/// Split orientation, encoded as the host does: 0 = side by side, 1 = stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Children laid out left to right (columns).
    Horizontal,
    /// Children laid out top to bottom (rows).
    Vertical,
}

impl Orientation {
    pub fn code(self) -> u8 {
        match self {
            Orientation::Horizontal => 0,
            Orientation::Vertical => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Orientation::Horizontal),
            1 => Some(Orientation::Vertical),
            _ => None,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }
}

/// Recursive editor layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "EditorLayoutDto", try_from = "EditorLayoutDto")]
pub enum GridLayout {
    /// A single group slot.
    Leaf,
    Split {
        orientation: Orientation,
        children: Vec<GridLayout>,
    },
}

/// Grid shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub rows: u32,
    pub cols: u32,
}

impl GridSize {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn single() -> Self {
        Self::new(1, 1)
    }

    pub fn cells(&self) -> u32 {
        self.rows.saturating_mul(self.cols)
    }
}

/// One step of a layout plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "group", rename_all = "camelCase")]
pub enum LayoutOp {
    SplitRight,
    SplitDown,
    /// Focus the n-th group (1-based, creation order). During a split plan
    /// the first `cols` groups created are the column heads.
    FocusGroup(u32),
}

impl GridLayout {
    /// Canonical tree for a uniform grid: columns at the top level, each
    /// column stacked into rows.
    pub fn uniform(rows: u32, cols: u32) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let column = if rows == 1 {
            GridLayout::Leaf
        } else {
            GridLayout::Split {
                orientation: Orientation::Vertical,
                children: vec![GridLayout::Leaf; rows as usize],
            }
        };
        if cols == 1 {
            column
        } else {
            GridLayout::Split {
                orientation: Orientation::Horizontal,
                children: vec![column; cols as usize],
            }
        }
    }

    pub fn dimensions(&self) -> GridSize {
        dimensions(self)
    }

    pub fn group_count(&self) -> usize {
        match self {
            GridLayout::Leaf => 1,
            GridLayout::Split { children, .. } if children.is_empty() => 1,
            GridLayout::Split { children, .. } => children.iter().map(|c| c.group_count()).sum(),
        }
    }
}

/// Rows x cols of a layout tree.
pub fn dimensions(layout: &GridLayout) -> GridSize {
    match layout {
        GridLayout::Leaf => GridSize::single(),
        GridLayout::Split {
            orientation,
            children,
        } => {
            let mut sizes = children.iter().map(dimensions);
            let Some(first) = sizes.next() else {
                return GridSize::single();
            };
            match orientation {
                Orientation::Horizontal => GridSize {
                    rows: first.rows,
                    cols: first.cols + sizes.map(|size| size.cols).sum::<u32>(),
                },
                Orientation::Vertical => GridSize {
                    rows: first.rows + sizes.map(|size| size.rows).sum::<u32>(),
                    cols: first.cols,
                },
            }
        }
    }
}

/// Commands that turn a single group into a `rows` x `cols` grid.
pub fn split_plan(rows: u32, cols: u32) -> Vec<LayoutOp> {
    let rows = rows.max(1);
    let cols = cols.max(1);
    let mut plan = Vec::new();

    for _ in 1..cols {
        plan.push(LayoutOp::SplitRight);
    }

    if rows > 1 {
        for col in 0..cols {
            if cols > 1 {
                plan.push(LayoutOp::FocusGroup(col + 1));
            }
            for _ in 1..rows {
                plan.push(LayoutOp::SplitDown);
            }
        }
    }

    plan
}

/// 1-based group number of a 0-based cell, in reading order.
pub fn cell_group_number(row: u32, col: u32, _rows: u32, cols: u32) -> u32 {
    row * cols + col + 1
}

/// Target group for each of `terminal_count` terminals, filling cells in
/// reading order and wrapping when there are more terminals than cells.
pub fn arrange_plan(terminal_count: usize, rows: u32, cols: u32) -> Vec<u32> {
    let rows = rows.max(1);
    let cols = cols.max(1);
    let cells = (rows * cols) as usize;
    (0..terminal_count)
        .map(|index| {
            let cell = (index % cells) as u32;
            cell_group_number(cell / cols, cell % cols, rows, cols)
        })
        .collect()
}

/// Applies a plan to a blank single-group canvas, modelling the host:
/// splits focus the new group, and splitting right on a multi-row column
/// splits every row of it. Returns `None` if the plan focuses a group that
/// doesn't exist.
pub fn simulate_plan(plan: &[LayoutOp]) -> Option<GridLayout> {
    // Each column is a top-to-bottom list of group ids (creation order, 1-based).
    let mut columns: Vec<Vec<u32>> = vec![vec![1]];
    let mut next_id = 2;
    let mut focused = 1;

    let locate = |columns: &Vec<Vec<u32>>, id: u32| -> Option<(usize, usize)> {
        columns.iter().enumerate().find_map(|(c, column)| {
            column.iter().position(|group| *group == id).map(|r| (c, r))
        })
    };

    for op in plan {
        match op {
            LayoutOp::SplitRight => {
                let (col, _) = locate(&columns, focused)?;
                let height = columns[col].len();
                let new_column: Vec<u32> = (0..height).map(|i| next_id + i as u32).collect();
                next_id += height as u32;
                focused = new_column[0];
                columns.insert(col + 1, new_column);
            }
            LayoutOp::SplitDown => {
                let (col, row) = locate(&columns, focused)?;
                columns[col].insert(row + 1, next_id);
                focused = next_id;
                next_id += 1;
            }
            LayoutOp::FocusGroup(n) => {
                locate(&columns, *n)?;
                focused = *n;
            }
        }
    }

    let mut trees: Vec<GridLayout> = columns
        .iter()
        .map(|column| {
            if column.len() == 1 {
                GridLayout::Leaf
            } else {
                GridLayout::Split {
                    orientation: Orientation::Vertical,
                    children: vec![GridLayout::Leaf; column.len()],
                }
            }
        })
        .collect();

    if trees.len() == 1 {
        return trees.pop();
    }
    Some(GridLayout::Split {
        orientation: Orientation::Horizontal,
        children: trees,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host wire shape
// ═══════════════════════════════════════════════════════════════════════════════

/// `{ "orientation": 0|1, "groups": [...] }` as the host reports it. Nested
/// groups implicitly alternate orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorLayoutDto {
    #[serde(default)]
    pub orientation: u8,
    #[serde(default)]
    pub groups: Vec<GroupDto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupDto {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

impl From<GridLayout> for EditorLayoutDto {
    fn from(layout: GridLayout) -> Self {
        match layout {
            GridLayout::Split {
                orientation,
                children,
            } if !children.is_empty() => EditorLayoutDto {
                orientation: orientation.code(),
                groups: children
                    .iter()
                    .map(|child| to_group(child, orientation.flipped()))
                    .collect(),
            },
            _ => EditorLayoutDto {
                orientation: Orientation::Horizontal.code(),
                groups: vec![GroupDto::default()],
            },
        }
    }
}

/// Encodes `node` as a group whose children are laid out along `orientation`.
fn to_group(node: &GridLayout, orientation: Orientation) -> GroupDto {
    match node {
        GridLayout::Split {
            orientation: own,
            children,
        } if !children.is_empty() => {
            if *own == orientation {
                GroupDto {
                    groups: children
                        .iter()
                        .map(|child| to_group(child, orientation.flipped()))
                        .collect(),
                    size: None,
                }
            } else {
                // Same orientation as the parent: nest one extra level so the
                // alternation still decodes to this split.
                GroupDto {
                    groups: vec![to_group(node, orientation.flipped())],
                    size: None,
                }
            }
        }
        _ => GroupDto::default(),
    }
}

impl TryFrom<EditorLayoutDto> for GridLayout {
    type Error = String;

    fn try_from(dto: EditorLayoutDto) -> Result<Self, Self::Error> {
        let orientation = Orientation::from_code(dto.orientation)
            .ok_or_else(|| format!("unknown layout orientation {}", dto.orientation))?;
        Ok(from_groups(orientation, &dto.groups))
    }
}

fn from_groups(orientation: Orientation, groups: &[GroupDto]) -> GridLayout {
    match groups {
        [] => GridLayout::Leaf,
        [only] => from_group(only, orientation.flipped()),
        many => GridLayout::Split {
            orientation,
            children: many
                .iter()
                .map(|group| from_group(group, orientation.flipped()))
                .collect(),
        },
    }
}

fn from_group(group: &GroupDto, orientation: Orientation) -> GridLayout {
    if group.groups.is_empty() {
        GridLayout::Leaf
    } else {
        from_groups(orientation, &group.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(orientation: Orientation, children: Vec<GridLayout>) -> GridLayout {
        GridLayout::Split {
            orientation,
            children,
        }
    }

    #[test]
    fn test_leaf_is_one_by_one() {
        assert_eq!(dimensions(&GridLayout::Leaf), GridSize::new(1, 1));
    }

    #[test]
    fn test_stacked_rows_of_three_columns() {
        let row = split(Orientation::Horizontal, vec![GridLayout::Leaf; 3]);
        let tree = split(Orientation::Vertical, vec![row.clone(), row]);
        assert_eq!(dimensions(&tree), GridSize::new(2, 3));
    }

    #[test]
    fn test_columns_of_stacked_groups() {
        let column = split(Orientation::Vertical, vec![GridLayout::Leaf; 4]);
        let tree = split(Orientation::Horizontal, vec![column.clone(), column]);
        assert_eq!(dimensions(&tree), GridSize::new(4, 2));
    }

    #[test]
    fn test_split_plan_two_by_three() {
        assert_eq!(
            split_plan(2, 3),
            vec![
                LayoutOp::SplitRight,
                LayoutOp::SplitRight,
                LayoutOp::FocusGroup(1),
                LayoutOp::SplitDown,
                LayoutOp::FocusGroup(2),
                LayoutOp::SplitDown,
                LayoutOp::FocusGroup(3),
                LayoutOp::SplitDown,
            ]
        );
    }

    #[test]
    fn test_split_plan_single_column_never_focuses() {
        assert_eq!(
            split_plan(3, 1),
            vec![LayoutOp::SplitDown, LayoutOp::SplitDown]
        );
        assert!(split_plan(1, 1).is_empty());
    }

    #[test]
    fn test_split_plan_single_row_only_splits_right() {
        assert_eq!(
            split_plan(1, 3),
            vec![LayoutOp::SplitRight, LayoutOp::SplitRight]
        );
    }

    #[test]
    fn test_uniform_matches_dimensions() {
        for rows in 1..=4 {
            for cols in 1..=4 {
                assert_eq!(
                    GridLayout::uniform(rows, cols).dimensions(),
                    GridSize::new(rows, cols)
                );
                assert_eq!(
                    GridLayout::uniform(rows, cols).group_count(),
                    (rows * cols) as usize
                );
            }
        }
    }

    #[test]
    fn test_simulate_rejects_unknown_focus() {
        assert!(simulate_plan(&[LayoutOp::FocusGroup(3)]).is_none());
    }

    #[test]
    fn test_splitting_right_on_multi_row_column_splits_every_row() {
        let tree = simulate_plan(&[LayoutOp::SplitDown, LayoutOp::SplitRight]).unwrap();
        assert_eq!(tree.dimensions(), GridSize::new(2, 2));
    }

    #[test]
    fn test_cell_numbers_follow_reading_order() {
        assert_eq!(cell_group_number(0, 0, 2, 3), 1);
        assert_eq!(cell_group_number(0, 2, 2, 3), 3);
        assert_eq!(cell_group_number(1, 0, 2, 3), 4);
        assert_eq!(cell_group_number(1, 2, 2, 3), 6);
    }

    #[test]
    fn test_arrange_wraps_extra_terminals() {
        assert_eq!(arrange_plan(5, 2, 2), vec![1, 2, 3, 4, 1]);
        assert!(arrange_plan(0, 2, 2).is_empty());
    }

    #[test]
    fn test_host_json_decodes_alternating_orientation() {
        let json = r#"{"orientation":1,"groups":[
            {"groups":[{},{},{}],"size":0.5},
            {"groups":[{},{},{}],"size":0.5}
        ]}"#;
        let layout: GridLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.dimensions(), GridSize::new(2, 3));
    }

    #[test]
    fn test_single_group_json_is_leaf() {
        let layout: GridLayout = serde_json::from_str(r#"{"orientation":0,"groups":[{}]}"#).unwrap();
        assert_eq!(layout, GridLayout::Leaf);
    }

    #[test]
    fn test_unknown_orientation_is_rejected() {
        assert!(serde_json::from_str::<GridLayout>(r#"{"orientation":7,"groups":[]}"#).is_err());
    }

    #[test]
    fn test_nested_same_orientation_survives_json() {
        let inner = split(Orientation::Horizontal, vec![GridLayout::Leaf; 2]);
        let tree = split(Orientation::Horizontal, vec![inner, GridLayout::Leaf]);
        let json = serde_json::to_string(&tree).unwrap();
        let decoded: GridLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tree);
    }
}
