use crate::error::{DataError, Result};

/// Merges an encoded source/target pair into one sequence:
/// `src ++ [sep] ++ trg`, with a conditioning mask covering src and the
/// separator.
///
/// Both inputs end in an end-of-text id. That id is held aside, the
/// longer side is popped token by token until the pair (plus separator
/// and both end ids) fits in `seq_len`, and the end ids are re-appended.
/// Equal-length sides shed one token each.
///
/// The returned mask holds a `0` for every src position and the
/// separator; padding later extends it with `1`s, so `0` marks the
/// positions that are conditioning rather than generation targets.
pub fn merge_and_mask(
    src: &[i64],
    trg: &[i64],
    seq_len: usize,
    sep_token_id: i64,
) -> Result<(Vec<i64>, Vec<i64>)> {
    if seq_len < 3 {
        return Err(DataError::SeqLenTooShort { seq_len });
    }
    let (&src_end, src_body) = src
        .split_last()
        .ok_or(DataError::EmptyEncoding { line: 0 })?;
    let (&trg_end, trg_body) = trg
        .split_last()
        .ok_or(DataError::EmptyEncoding { line: 0 })?;

    let mut src = src_body.to_vec();
    let mut trg = trg_body.to_vec();
    while src.len() + trg.len() > seq_len - 3 {
        if src.len() > trg.len() {
            src.pop();
        } else if src.len() < trg.len() {
            trg.pop();
        } else {
            src.pop();
            trg.pop();
        }
    }
    src.push(src_end);
    trg.push(trg_end);

    let mask = vec![0; src.len() + 1];
    let mut ids = src;
    ids.push(sep_token_id);
    ids.extend_from_slice(&trg);
    Ok((ids, mask))
}

/// Right-pads (or truncates) `values` to exactly `max_len`.
pub fn pad_to(values: &[i64], pad_value: i64, max_len: usize) -> Vec<i64> {
    let mut out = vec![pad_value; max_len];
    let len = values.len().min(max_len);
    out[..len].copy_from_slice(&values[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: i64 = 100;
    const END: i64 = 99;

    #[test]
    fn short_pair_is_joined_with_separator() {
        let src = [1, 2, END];
        let trg = [3, END];
        let (ids, mask) = merge_and_mask(&src, &trg, 16, SEP).unwrap();

        assert_eq!(ids, vec![1, 2, END, SEP, 3, END]);
        // src (3 ids) plus the separator are conditioning positions.
        assert_eq!(mask, vec![0, 0, 0, 0]);
    }

    #[test]
    fn longer_side_is_truncated_first() {
        // src body 6 tokens, trg body 1; budget seq_len - 3 = 4.
        let src = [1, 2, 3, 4, 5, 6, END];
        let trg = [7, END];
        let (ids, _) = merge_and_mask(&src, &trg, 7, SEP).unwrap();

        assert_eq!(ids, vec![1, 2, 3, END, SEP, 7, END]);
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn equal_sides_shed_one_token_each() {
        let src = [1, 2, 3, END];
        let trg = [4, 5, 6, END];
        // budget 4 -> one pop from each side leaves 2 + 2.
        let (ids, _) = merge_and_mask(&src, &trg, 7, SEP).unwrap();
        assert_eq!(ids, vec![1, 2, END, SEP, 4, 5, END]);
    }

    #[test]
    fn pad_fills_and_truncates() {
        assert_eq!(pad_to(&[1, 2], 0, 4), vec![1, 2, 0, 0]);
        assert_eq!(pad_to(&[1, 2, 3, 4, 5], 0, 3), vec![1, 2, 3]);
    }

    #[test]
    fn empty_encoding_is_rejected() {
        assert!(matches!(
            merge_and_mask(&[], &[1, END], 16, SEP),
            Err(DataError::EmptyEncoding { .. })
        ));
    }
}
