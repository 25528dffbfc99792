//! The game board: a static, undirected graph of category-colored tiles.
//!
//! The board is pure and stateless. The one non-trivial operation is
//! [`Board::choices`]: the exact-length breadth expansion that computes
//! which tiles a dice roll can reach, and by which path.
//!
//! ## Standard board
//!
//! [`Board::standard`] builds the 17-tile board the game ships with: a
//! 14-tile outer loop plus a 3-tile shortcut through the middle, giving
//! two "cross" tiles of degree 3. Tile 0 is the pawn's starting
//! position.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use thiserror::Error;

use crate::core::{Category, CATEGORY_COUNT};

/// Number of tiles on the standard board.
pub const STANDARD_TILE_COUNT: usize = 17;

/// A board position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub u8);

impl TileId {
    /// The pawn's starting tile.
    pub const START: TileId = TileId(0);

    /// Raw tile index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile {}", self.0)
    }
}

/// An ordered walk over the board, origin first, destination last.
///
/// Die faces are small (at most 3), so a path holds at most 4 tiles and
/// stays inline.
pub type TilePath = SmallVec<[TileId; 4]>;

/// Errors from building a custom board.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    /// The category table is empty.
    #[error("board has no tiles")]
    Empty,
    /// An edge references a tile outside the category table.
    #[error("edge ({0}, {1}) references a tile out of range")]
    EdgeOutOfRange(u8, u8),
    /// The graph is not connected.
    #[error("board graph is not connected")]
    Disconnected,
}

/// Static board graph with per-tile category coloring.
#[derive(Clone, Debug)]
pub struct Board {
    adjacency: Vec<SmallVec<[TileId; 3]>>,
    categories: Vec<Category>,
}

impl Board {
    /// Build a board from a per-tile category table and an undirected
    /// edge list.
    ///
    /// Self-loops in the edge list are dropped, duplicate edges
    /// collapse. Fails if the table is empty, an edge is out of range,
    /// or the graph is not connected.
    pub fn new(categories: Vec<Category>, edges: &[(u8, u8)]) -> Result<Self, BoardError> {
        if categories.is_empty() {
            return Err(BoardError::Empty);
        }
        let count = categories.len();
        let mut adjacency: Vec<SmallVec<[TileId; 3]>> = vec![SmallVec::new(); count];
        for &(a, b) in edges {
            if a as usize >= count || b as usize >= count {
                return Err(BoardError::EdgeOutOfRange(a, b));
            }
            if a == b {
                continue;
            }
            if !adjacency[a as usize].contains(&TileId(b)) {
                adjacency[a as usize].push(TileId(b));
            }
            if !adjacency[b as usize].contains(&TileId(a)) {
                adjacency[b as usize].push(TileId(a));
            }
        }

        let board = Self {
            adjacency,
            categories,
        };
        if !board.is_connected() {
            return Err(BoardError::Disconnected);
        }
        Ok(board)
    }

    /// The standard 17-tile board: outer loop 0..=13 plus the shortcut
    /// 3-14-15-16-10. Tiles 3 and 10 are the degree-3 crossings.
    /// Categories cycle through [`Category::ALL`] by tile index.
    #[must_use]
    pub fn standard() -> Self {
        let categories = (0..STANDARD_TILE_COUNT)
            .map(|i| Category::ALL[i % CATEGORY_COUNT])
            .collect();
        let mut edges: Vec<(u8, u8)> = (0..14u8).map(|i| (i, (i + 1) % 14)).collect();
        edges.extend_from_slice(&[(3, 14), (14, 15), (15, 16), (16, 10)]);

        match Self::new(categories, &edges) {
            Ok(board) => board,
            // The standard layout is validated by tests; unreachable.
            Err(err) => unreachable!("standard board invalid: {err}"),
        }
    }

    /// Number of tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.categories.len()
    }

    /// Whether `tile` is a valid index on this board.
    #[must_use]
    pub fn contains(&self, tile: TileId) -> bool {
        tile.index() < self.tile_count()
    }

    /// Category of a tile.
    ///
    /// ## Panics
    ///
    /// Panics if the tile is out of range; the state machine only ever
    /// calls this with validated destinations.
    #[must_use]
    pub fn category(&self, tile: TileId) -> Category {
        self.categories[tile.index()]
    }

    /// Neighbors of a tile. Self-loops are never present.
    #[must_use]
    pub fn adjacents(&self, tile: TileId) -> &[TileId] {
        &self.adjacency[tile.index()]
    }

    /// Every tile reachable from `from` in exactly `nb_moves` steps,
    /// mapped to one path that reaches it.
    ///
    /// At each step every live path extends to every neighbor except the
    /// tile immediately preceding it on that same path: no immediate
    /// backtrack within one roll, but a tile may be revisited via a
    /// different route through a crossing. Duplicate destinations
    /// collapse to the first path found.
    #[must_use]
    pub fn choices(&self, from: TileId, nb_moves: u8) -> FxHashMap<TileId, TilePath> {
        struct Walk {
            at: TileId,
            prev: Option<TileId>,
            path: TilePath,
        }

        let mut frontier = vec![Walk {
            at: from,
            prev: None,
            path: smallvec![from],
        }];

        for _ in 0..nb_moves {
            let mut next = Vec::with_capacity(frontier.len() * 2);
            for walk in &frontier {
                for &neighbor in self.adjacents(walk.at) {
                    if walk.prev == Some(neighbor) {
                        continue;
                    }
                    let mut path = walk.path.clone();
                    path.push(neighbor);
                    next.push(Walk {
                        at: neighbor,
                        prev: Some(walk.at),
                        path,
                    });
                }
            }
            frontier = next;
        }

        let mut reachable = FxHashMap::default();
        for walk in frontier {
            reachable.entry(walk.at).or_insert(walk.path);
        }
        reachable
    }

    fn is_connected(&self) -> bool {
        let mut seen = vec![false; self.tile_count()];
        let mut stack = vec![TileId(0)];
        seen[0] = true;
        while let Some(tile) = stack.pop() {
            for &next in self.adjacents(tile) {
                if !seen[next.index()] {
                    seen[next.index()] = true;
                    stack.push(next);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_board_shape() {
        let board = Board::standard();
        assert_eq!(board.tile_count(), STANDARD_TILE_COUNT);

        let degrees: Vec<usize> = (0..17).map(|i| board.adjacents(TileId(i)).len()).collect();
        assert_eq!(degrees[3], 3, "tile 3 is a crossing");
        assert_eq!(degrees[10], 3, "tile 10 is a crossing");
        assert_eq!(degrees.iter().filter(|&&d| d == 3).count(), 2);
        assert!(degrees.iter().all(|&d| d == 2 || d == 3));
    }

    #[test]
    fn standard_board_covers_all_categories() {
        let board = Board::standard();
        for cat in Category::ALL {
            let count = (0..17).filter(|&i| board.category(TileId(i)) == cat).count();
            assert!(count >= 3, "{cat} appears on at least 3 tiles");
        }
    }

    #[test]
    fn choices_from_start_two_moves() {
        let board = Board::standard();
        let reachable = board.choices(TileId::START, 2);

        let mut tiles: Vec<_> = reachable.keys().copied().collect();
        tiles.sort();
        assert_eq!(tiles, vec![TileId(2), TileId(12)]);

        let path: &TilePath = &reachable[&TileId(2)];
        assert_eq!(path.as_slice(), &[TileId(0), TileId(1), TileId(2)]);
    }

    #[test]
    fn choices_through_crossing() {
        let board = Board::standard();
        let reachable = board.choices(TileId(3), 1);
        let mut tiles: Vec<_> = reachable.keys().copied().collect();
        tiles.sort();
        assert_eq!(tiles, vec![TileId(2), TileId(4), TileId(14)]);
    }

    #[test]
    fn no_immediate_backtrack() {
        let board = Board::standard();
        // From tile 1 with 2 moves: 1-2-3 and 1-0-13, never back to 1.
        let reachable = board.choices(TileId(1), 2);
        assert!(!reachable.contains_key(&TileId(1)));
    }

    #[test]
    fn revisit_allowed_via_different_route() {
        // Triangle: a cycle of length 3 lets a walk return to its origin
        // without ever immediately reversing an edge.
        let categories = vec![Category::Arithmetic, Category::Geometry, Category::Logic];
        let board = Board::new(categories, &[(0, 1), (1, 2), (2, 0)]).unwrap();

        let reachable = board.choices(TileId(0), 3);
        let path = reachable.get(&TileId(0)).expect("origin reachable in 3");
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], TileId(0));
        assert_eq!(path[3], TileId(0));
    }

    #[test]
    fn self_loops_dropped() {
        let categories = vec![Category::Arithmetic, Category::Geometry];
        let board = Board::new(categories, &[(0, 1), (1, 1)]).unwrap();
        assert_eq!(board.adjacents(TileId(1)), &[TileId(0)]);
    }

    #[test]
    fn rejects_disconnected_and_out_of_range() {
        let categories = vec![Category::Arithmetic; 4];
        assert_eq!(
            Board::new(categories.clone(), &[(0, 1), (2, 3)]).unwrap_err(),
            BoardError::Disconnected
        );
        assert_eq!(
            Board::new(categories, &[(0, 9)]).unwrap_err(),
            BoardError::EdgeOutOfRange(0, 9)
        );
        assert_eq!(Board::new(vec![], &[]).unwrap_err(), BoardError::Empty);
    }

    /// Reference enumeration: all non-backtracking walks of exactly `k`
    /// edges, written recursively so it cannot share a bug with the
    /// breadth expansion.
    fn walk_destinations(board: &Board, at: TileId, prev: Option<TileId>, k: u8) -> Vec<TileId> {
        if k == 0 {
            return vec![at];
        }
        let mut out = Vec::new();
        for &next in board.adjacents(at) {
            if prev == Some(next) {
                continue;
            }
            out.extend(walk_destinations(board, next, Some(at), k - 1));
        }
        out
    }

    proptest! {
        #[test]
        fn choices_matches_walk_enumeration(tile in 0u8..17, moves in 1u8..=3) {
            let board = Board::standard();
            let reachable = board.choices(TileId(tile), moves);

            let mut expected: Vec<TileId> =
                walk_destinations(&board, TileId(tile), None, moves);
            expected.sort();
            expected.dedup();

            let mut got: Vec<TileId> = reachable.keys().copied().collect();
            got.sort();
            prop_assert_eq!(got, expected);

            for (dest, path) in &reachable {
                prop_assert_eq!(path.len(), moves as usize + 1);
                prop_assert_eq!(path[0], TileId(tile));
                prop_assert_eq!(path[path.len() - 1], *dest);
                for w in path.windows(2) {
                    prop_assert!(board.adjacents(w[0]).contains(&w[1]));
                }
                for w in path.windows(3) {
                    prop_assert!(w[0] != w[2], "immediate backtrack in {:?}", path);
                }
            }
        }
    }
}
