use super::cards::{total_value, Card};

pub const TARGET_SUM: u32 = 15;

// Tables never grow much beyond ten cards in a real game, so enumerating all
// 2^n - 1 subsets stays cheap. This is not meant for arbitrary table sizes.
const MAX_TABLE: usize = 20;

// Every subset of the table that sums up to 15 together with the played card.
// Subsets come out in bitmask order and keep the table's card order.
pub fn find_captures(played: Card, table: &[Card]) -> Vec<Vec<Card>> {
    let needed = match TARGET_SUM.checked_sub(played.value()) {
        Some(n) if n > 0 => n,
        _ => return Vec::new(),
    };

    if table.len() > MAX_TABLE {
        log::warn!("Table of {} cards is past the search bound, only the first {} are considered", table.len(), MAX_TABLE);
    }
    let table = &table[..table.len().min(MAX_TABLE)];

    let mut captures = Vec::new();
    for mask in 1u32..(1 << table.len()) {
        let subset: Vec<Card> = table
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, &c)| c)
            .collect();

        if total_value(&subset) == needed {
            captures.push(subset);
        }
    }

    captures
}

// Tell if playing `played` with `capture` is a legal capture
pub fn is_valid_capture(played: Card, capture: &[Card]) -> bool {
    !capture.is_empty() && played.value() + total_value(capture) == TARGET_SUM
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::escoba::cards::{Rank, Suit};

    fn c(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    #[test]
    fn test_single_and_multi_card_captures() {
        let played = c(Rank::Five, Suit::Cups);
        let table = vec![
            c(Rank::King, Suit::Coins),
            c(Rank::Four, Suit::Swords),
            c(Rank::Six, Suit::Batons),
            c(Rank::Three, Suit::Cups),
        ];

        let captures = find_captures(played, &table);
        assert_eq!(captures, vec![
            vec![c(Rank::King, Suit::Coins)],
            vec![c(Rank::Four, Suit::Swords), c(Rank::Six, Suit::Batons)],
        ]);
        for capture in &captures {
            assert!(is_valid_capture(played, capture));
        }
    }

    #[test]
    fn test_no_capture() {
        let played = c(Rank::One, Suit::Cups);
        let table = vec![c(Rank::Two, Suit::Coins), c(Rank::Three, Suit::Swords)];
        assert!(find_captures(played, &table).is_empty());
        assert!(find_captures(played, &[]).is_empty());
    }

    #[test]
    fn test_whole_table_capture() {
        let played = c(Rank::Seven, Suit::Coins);
        let table = vec![c(Rank::One, Suit::Cups), c(Rank::Three, Suit::Swords), c(Rank::Four, Suit::Batons)];
        assert_eq!(find_captures(played, &table), vec![table.clone()]);
    }

    #[test]
    fn test_counts_equal_value_alternatives() {
        let played = c(Rank::Knight, Suit::Coins);
        let table = vec![
            c(Rank::Six, Suit::Cups),
            c(Rank::Six, Suit::Swords),
            c(Rank::Six, Suit::Batons),
        ];
        assert_eq!(find_captures(played, &table).len(), 3);
    }

    #[test]
    fn test_empty_capture_is_not_valid() {
        assert!(!is_valid_capture(c(Rank::King, Suit::Coins), &[]));
        assert!(!is_valid_capture(c(Rank::King, Suit::Coins), &[c(Rank::Four, Suit::Cups)]));
    }
}
