//! Page packing – greedy assignment of measured blocks to fixed-height pages.
//!
//! Handles:
//! - A reduced first-page budget when an intro is reserved
//! - Forced page breaks before a block
//! - Oversized blocks (placed alone, never split)

use serde::Serialize;

/// A page whose used height is this far below its budget is "short".
const SHORT_PAGE_SLACK_PX: f32 = 4.0;

/// Everything the packer needs, by reference.
///
/// `heights` and `break_before` are parallel to `nodes`. A missing height
/// counts as zero and a missing break flag as `false`.
#[derive(Debug, Clone, Copy)]
pub struct PaginationInput<'a, B> {
    pub nodes: &'a [B],
    pub heights: &'a [f32],
    pub intro_height: f32,
    pub gap_px: f32,
    pub body_px: f32,
    pub break_before: Option<&'a [bool]>,
}

/// One output page: a contiguous run of the input blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageData<B> {
    pub nodes: Vec<B>,
    pub used_px: f32,
    pub is_short: bool,
}

/// Partition `input.nodes` into pages.
///
/// Blocks measured at exactly 0 px are left out of every page. The first
/// page's budget is `body_px - intro_height`, every later page gets
/// `body_px`. A block only closes the current page when the page already
/// holds something, so a block taller than the budget sits alone.
pub fn paginate_blocks<B: Clone>(input: &PaginationInput<'_, B>) -> Vec<PageData<B>> {
    let mut pages: Vec<PageData<B>> = Vec::new();
    let mut current: Vec<B> = Vec::new();
    let mut used = 0.0f32;
    let first_limit = input.body_px - input.intro_height;

    for (i, node) in input.nodes.iter().enumerate() {
        let h = input.heights.get(i).copied().unwrap_or(0.0);
        if h == 0.0 {
            continue;
        }
        let limit = if pages.is_empty() { first_limit } else { input.body_px };
        let height_to_add = if current.is_empty() { h } else { h + input.gap_px };
        let force_break = input
            .break_before
            .and_then(|flags| flags.get(i).copied())
            .unwrap_or(false)
            && !current.is_empty();

        if (used + height_to_add > limit && !current.is_empty()) || force_break {
            log::debug!(
                "Closing page {} at {used:.1}px (limit {limit:.1}px{})",
                pages.len() + 1,
                if force_break { ", forced break" } else { "" }
            );
            pages.push(PageData {
                nodes: std::mem::replace(&mut current, vec![node.clone()]),
                used_px: used,
                is_short: used < limit - SHORT_PAGE_SLACK_PX,
            });
            used = h;
        } else {
            current.push(node.clone());
            used += height_to_add;
        }
    }

    if !current.is_empty() {
        let last_limit = if pages.is_empty() { first_limit } else { input.body_px };
        pages.push(PageData {
            nodes: current,
            used_px: used,
            is_short: used < last_limit - SHORT_PAGE_SLACK_PX,
        });
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(
        heights: &[f32],
        gap: f32,
        body: f32,
        intro: f32,
        breaks: Option<&[bool]>,
    ) -> Vec<PageData<usize>> {
        let nodes: Vec<usize> = (0..heights.len()).collect();
        paginate_blocks(&PaginationInput {
            nodes: &nodes,
            heights,
            intro_height: intro,
            gap_px: gap,
            body_px: body,
            break_before: breaks,
        })
    }

    fn indices(pages: &[PageData<usize>]) -> Vec<Vec<usize>> {
        pages.iter().map(|p| p.nodes.clone()).collect()
    }

    #[test]
    fn fills_pages_greedily() {
        let pages = pack(&[100.0; 5], 10.0, 320.0, 0.0, None);
        assert_eq!(indices(&pages), vec![vec![0, 1, 2], vec![3, 4]]);
        assert_eq!(pages[0].used_px, 320.0);
        assert!(!pages[0].is_short);
        assert_eq!(pages[1].used_px, 210.0);
        assert!(pages[1].is_short);
    }

    #[test]
    fn forced_break_starts_a_new_page() {
        let breaks = [false, false, false, true, false];
        let pages = pack(&[100.0; 5], 10.0, 320.0, 0.0, Some(&breaks));
        assert_eq!(indices(&pages), vec![vec![0, 1, 2], vec![3, 4]]);

        let early = [false, true, false, false, false];
        let pages = pack(&[100.0; 5], 10.0, 320.0, 0.0, Some(&early));
        assert_eq!(indices(&pages), vec![vec![0], vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn break_on_first_block_is_a_no_op() {
        let breaks = [true, false];
        let pages = pack(&[50.0, 50.0], 0.0, 320.0, 0.0, Some(&breaks));
        assert_eq!(indices(&pages), vec![vec![0, 1]]);
    }

    #[test]
    fn oversized_block_sits_alone() {
        let pages = pack(&[500.0], 10.0, 320.0, 0.0, None);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].used_px, 500.0);
        assert!(!pages[0].is_short);

        let pages = pack(&[100.0, 500.0, 100.0], 10.0, 320.0, 0.0, None);
        assert_eq!(indices(&pages), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn intro_reduces_only_the_first_page() {
        // First page budget 320 - 120 = 200: two blocks of 90 + gap 10.
        let pages = pack(&[90.0; 6], 10.0, 320.0, 120.0, None);
        assert_eq!(indices(&pages), vec![vec![0, 1], vec![2, 3, 4], vec![5]]);
    }

    #[test]
    fn single_page_uses_first_limit_for_short_flag() {
        // 180 used against a first-page budget of 182 is not short.
        let pages = pack(&[180.0], 0.0, 320.0, 138.0, None);
        assert!(!pages[0].is_short);
        // The same block on a second page is measured against 320.
        let pages = pack(&[180.0, 180.0], 0.0, 320.0, 138.0, None);
        assert!(!pages[0].is_short);
        assert!(pages[1].is_short);
    }

    #[test]
    fn zero_height_blocks_are_dropped() {
        let pages = pack(&[100.0, 0.0, 100.0], 10.0, 320.0, 0.0, None);
        assert_eq!(indices(&pages), vec![vec![0, 2]]);
        assert!(pack(&[0.0, 0.0], 10.0, 320.0, 0.0, None).is_empty());
    }

    #[test]
    fn coverage_and_budget_hold_for_mixed_heights() {
        let heights = [37.5, 210.0, 88.0, 140.25, 12.0, 300.0, 61.0, 99.0, 250.0, 4.0];
        let body = 320.0;
        let pages = pack(&heights, 16.0, body, 40.0, None);
        let flat: Vec<usize> = pages.iter().flat_map(|p| p.nodes.clone()).collect();
        assert_eq!(flat, (0..heights.len()).collect::<Vec<_>>());
        for (i, page) in pages.iter().enumerate() {
            let limit = if i == 0 { body - 40.0 } else { body };
            if page.nodes.len() > 1 {
                assert!(page.used_px <= limit, "page {i} used {}", page.used_px);
            }
        }
    }

    #[test]
    fn packing_is_idempotent() {
        let heights = [120.0, 80.0, 200.0, 40.0];
        let a = pack(&heights, 16.0, 300.0, 0.0, None);
        let b = pack(&heights, 16.0, 300.0, 0.0, None);
        assert_eq!(a, b);
    }
}
