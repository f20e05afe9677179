//! Adapter over shakmaty: SAN resolution against the legal-move set,
//! PolyGlot Zobrist keys, and PolyGlot move packing.
//!
//! shakmaty's zobrist hashing follows the PolyGlot constants, and its
//! castling moves already use the "king captures own rook" representation,
//! so both wire contracts fall out of the library directly.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role};

/// Outcome of resolving one SAN token.
#[derive(Debug, Clone)]
pub enum SanMatch {
    /// A concrete legal move.
    Move(Move),
    /// The null move token `--`.
    Null,
    /// No legal move matches the token.
    None,
}

/// PolyGlot Zobrist key of a position.
#[inline]
pub fn key(pos: &Chess) -> u64 {
    let z: Zobrist64 = pos.zobrist_hash(EnPassantMode::Legal);
    z.0
}

/// Build a position from a FEN byte string, standard castling rules.
pub fn from_fen(fen: &[u8]) -> Option<Chess> {
    let fen: Fen = std::str::from_utf8(fen).ok()?.parse().ok()?;
    fen.into_position(CastlingMode::Standard).ok()
}

/// Resolve one SAN token against the current legal moves.
///
/// Strict resolution goes through shakmaty. Real archives misspell castling
/// with zeros and carry wrong or missing disambiguation; both are repaired
/// here, and every repair increments `fixed` (reported as "Incorrect moves"
/// in the build stats).
pub fn san_to_move(pos: &Chess, token: &[u8], fixed: &mut u64) -> SanMatch {
    if token == b"--" {
        return SanMatch::Null;
    }
    match San::from_ascii(token) {
        Ok(San::Null) => SanMatch::Null,
        Ok(san) => match san.to_move(pos) {
            Ok(m) => SanMatch::Move(m),
            Err(_) => relaxed_match(pos, &san, fixed),
        },
        Err(_) => zero_castle(pos, token, fixed),
    }
}

/// Accept a unique legal move with the right piece, target square and
/// promotion when the strict match fails on its disambiguators.
fn relaxed_match(pos: &Chess, san: &San, fixed: &mut u64) -> SanMatch {
    let (role, to, promotion) = match san {
        San::Normal { role, to, promotion, .. } => (*role, *to, *promotion),
        _ => return SanMatch::None,
    };

    let mut found = None;
    for m in &pos.legal_moves() {
        let candidate = match m {
            Move::Normal { role: r, to: t, promotion: p, .. } => {
                *r == role && *t == to && *p == promotion
            }
            Move::EnPassant { to: t, .. } => {
                role == Role::Pawn && *t == to && promotion.is_none()
            }
            _ => false,
        };
        if candidate {
            if found.is_some() {
                return SanMatch::None; // still ambiguous
            }
            found = Some(m.clone());
        }
    }

    match found {
        Some(m) => {
            *fixed += 1;
            SanMatch::Move(m)
        }
        None => SanMatch::None,
    }
}

/// Castling written with zeros or lowercase o's: 0-0, o-o-o, ...
fn zero_castle(pos: &Chess, token: &[u8], fixed: &mut u64) -> SanMatch {
    if !token.starts_with(b"0") && !token.starts_with(b"o") {
        return SanMatch::None;
    }
    let normalized: Vec<u8> = token
        .iter()
        .map(|&b| if b == b'0' || b == b'o' { b'O' } else { b })
        .collect();
    let Ok(san) = San::from_ascii(&normalized) else {
        return SanMatch::None;
    };
    match san.to_move(pos) {
        Ok(m) => {
            *fixed += 1;
            SanMatch::Move(m)
        }
        Err(_) => SanMatch::None,
    }
}

/// Pack a move into the PolyGlot wire layout: destination in bits 0-5,
/// origin in bits 6-11, promotion piece (knight=1 .. queen=4) from bit 12.
pub fn to_polyglot(m: &Move) -> u16 {
    match m {
        Move::Normal { from, to, promotion, .. } => {
            let raw = *to as u16 | ((*from as u16) << 6);
            match promotion {
                Some(role) => raw | ((*role as u16 - 1) << 12),
                None => raw,
            }
        }
        Move::EnPassant { from, to } => *to as u16 | ((*from as u16) << 6),
        Move::Castle { king, rook } => *rook as u16 | ((*king as u16) << 6),
        // Drops only exist in variants; the parser never produces them.
        Move::Put { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(pos: &Chess, token: &[u8]) -> (SanMatch, u64) {
        let mut fixed = 0;
        let m = san_to_move(pos, token, &mut fixed);
        (m, fixed)
    }

    #[test]
    fn test_start_position_key_matches_polyglot() {
        assert_eq!(key(&Chess::default()), 0x463b_9618_1691_fc9c);
    }

    #[test]
    fn test_pack_simple_move() {
        let pos = Chess::default();
        let (m, fixed) = resolve(&pos, b"e4");
        let SanMatch::Move(m) = m else { panic!("e4 should resolve") };
        // e2=12, e4=28
        assert_eq!(to_polyglot(&m), 28 | (12 << 6));
        assert_eq!(fixed, 0);
    }

    #[test]
    fn test_pack_castle_as_king_takes_rook() {
        let pos = from_fen(b"r1bqk1nr/pppp1ppp/2n5/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4")
            .expect("legal position");
        let (m, _) = resolve(&pos, b"O-O");
        let SanMatch::Move(m) = m else { panic!("O-O should resolve") };
        // e1=4, h1=7
        assert_eq!(to_polyglot(&m), 7 | (4 << 6));
    }

    #[test]
    fn test_pack_queen_promotion() {
        let pos = from_fen(b"k7/4P3/8/8/8/8/8/4K3 w - - 0 1").expect("legal position");
        let (m, _) = resolve(&pos, b"e8=Q");
        let SanMatch::Move(m) = m else { panic!("e8=Q should resolve") };
        let packed = to_polyglot(&m);
        // e7=52, e8=60, queen promotion stores 4 from bit 12
        assert_eq!(packed, 60 | (52 << 6) | (4 << 12));
        assert_eq!(packed >> 12, 4);
    }

    #[test]
    fn test_zero_castle_is_fixed() {
        let pos = from_fen(b"r1bqk1nr/pppp1ppp/2n5/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4")
            .expect("legal position");
        let (m, fixed) = resolve(&pos, b"0-0");
        assert!(matches!(m, SanMatch::Move(_)));
        assert_eq!(fixed, 1);
    }

    #[test]
    fn test_null_move_token() {
        let pos = Chess::default();
        let (m, fixed) = resolve(&pos, b"--");
        assert!(matches!(m, SanMatch::Null));
        assert_eq!(fixed, 0);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let pos = Chess::default();
        let (m, fixed) = resolve(&pos, b"Zz9");
        assert!(matches!(m, SanMatch::None));
        // Illegal but well-formed SAN is rejected too.
        let (m, _) = resolve(&pos, b"Qh5");
        assert!(matches!(m, SanMatch::None));
        assert_eq!(fixed, 0);
    }
}
