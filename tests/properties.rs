use std::sync::Arc;

use mbrope::*;
use proptest::prelude::*;
use proptest::sample::{select, Index};

/// Byte soup which is mostly text, with the odd stray high byte.
fn content() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => "[a-z \\x00éせ😀]{0,150}".prop_map(String::into_bytes),
        1 => prop::collection::vec(any::<u8>(), 0..60),
    ]
}

/// A rope built out of random leaf / concat / substring / repeat operations,
/// along with the bytes it should contain.
fn arb_rope(enc: &'static Encoding) -> impl Strategy<Value = (Rope, Vec<u8>)> {
    let leaf = content().prop_map(move |b| (Rope::leaf(b.clone(), enc), b));
    leaf.prop_recursive(5, 48, 2, move |inner| prop_oneof![
        (inner.clone(), inner.clone()).prop_map(move |((l, lb), (r, rb))| {
            (Rope::concat(&l, &r, enc).unwrap(), [lb, rb].concat())
        }),
        (inner.clone(), any::<Index>(), any::<Index>()).prop_map(|((r, b), i, j)| {
            let offset = i.index(b.len() + 1);
            let len = j.index(b.len() - offset + 1);
            (r.substring(offset, len).unwrap(), b[offset..offset + len].to_vec())
        }),
        (inner, 0usize..4).prop_map(|((r, b), k)| (r.repeat(k).unwrap(), b.repeat(k))),
    ])
}

fn any_rope() -> impl Strategy<Value = (Rope, Vec<u8>)> {
    select(Encoding::all()).prop_flat_map(arb_rope)
}

proptest! {
    #[test]
    fn bytes_match_model((rope, model) in any_rope()) {
        prop_assert_eq!(rope.len_bytes(), model.len());
        prop_assert_eq!(rope.to_vec(), model.clone());
        prop_assert_eq!(rope.bytes(), &model[..]);
        prop_assert_eq!(rope.len_bytes(), rope.bytes().len());
    }

    #[test]
    fn materializing_is_faithful((rope, _) in any_rope()) {
        let copy = Rope::leaf(rope.bytes(), rope.encoding());
        prop_assert_eq!(copy.bytes(), rope.bytes());
        prop_assert_eq!(&copy, &rope);
        prop_assert_eq!(copy.hash_code(), rope.hash_code());
        prop_assert_eq!(copy.len_chars(), rope.len_chars());
        prop_assert_eq!(copy.code_range(), rope.code_range());
    }

    #[test]
    fn concat_appends((l, lb) in arb_rope(&UTF_8), (r, rb) in arb_rope(&UTF_8)) {
        let c = Rope::concat(&l, &r, &UTF_8).unwrap();
        prop_assert_eq!(c.to_vec(), [lb, rb].concat());
        prop_assert_eq!(c.len_bytes(), l.len_bytes() + r.len_bytes());
    }

    #[test]
    fn substring_slices((rope, model) in any_rope(), i in any::<Index>(), j in any::<Index>()) {
        let offset = i.index(model.len() + 1);
        let len = j.index(model.len() - offset + 1);
        let s = rope.substring(offset, len).unwrap();
        prop_assert_eq!(s.bytes(), &model[offset..offset + len]);
        prop_assert!(rope.substring(offset, model.len() - offset + 1).is_err());
    }

    #[test]
    fn repeat_multiplies((rope, model) in any_rope(), k in 0usize..6) {
        let r = rope.repeat(k).unwrap();
        prop_assert_eq!(r.len_bytes(), k * model.len());
        prop_assert_eq!(r.to_vec(), model.repeat(k));
    }

    #[test]
    fn substrings_collapse((rope, model) in any_rope(),
                           a in any::<Index>(), b in any::<Index>(),
                           c in any::<Index>(), d in any::<Index>()) {
        let outer_off = a.index(model.len() + 1);
        let outer_len = b.index(model.len() - outer_off + 1);
        let inner_off = c.index(outer_len + 1);
        let inner_len = d.index(outer_len - inner_off + 1);

        let nested = rope.substring(outer_off, outer_len).unwrap().substring(inner_off, inner_len).unwrap();
        let direct = rope.substring(outer_off + inner_off, inner_len).unwrap();
        prop_assert_eq!(&nested, &direct);
        prop_assert_eq!(nested.len_chars(), direct.len_chars());
        prop_assert_eq!(nested.code_range(), direct.code_range());
    }

    #[test]
    fn empty_is_identity((rope, _) in any_rope()) {
        let enc = rope.encoding();
        prop_assert_eq!(&Rope::concat(&Rope::empty(enc), &rope, enc).unwrap(), &rope);
        prop_assert_eq!(&Rope::concat(&rope, &Rope::empty(enc), enc).unwrap(), &rope);
    }

    #[test]
    fn cached_code_range_never_lies((rope, model) in any_rope()) {
        let cached = rope.cached_code_range();
        let cached_chars = rope.cached_char_len();
        let (fresh, chars) = classify(rope.encoding(), &model, 0, model.len());

        prop_assert!(fresh.refines(cached));
        prop_assert!(cached_chars.map_or(true, |n| n == chars));
        prop_assert_eq!(rope.code_range(), fresh);
        prop_assert_eq!(rope.len_chars(), chars);
        prop_assert_ne!(rope.code_range(), CodeRange::Unknown);
    }

    #[test]
    fn equal_ropes_hash_equal((rope, model) in any_rope()) {
        let flat = Rope::leaf(model, rope.encoding());
        prop_assert!(flat == rope);
        prop_assert_eq!(flat.hash_code(), rope.hash_code());
    }

    #[test]
    fn char_offsets_round_trip((rope, _) in any_rope(), i in any::<Index>()) {
        let n = rope.len_chars();
        let c = i.index(n + 1);
        let b = rope.char_to_byte(c).unwrap();
        prop_assert!(b <= rope.len_bytes());
        prop_assert_eq!(rope.byte_to_char(b).unwrap(), c);
    }

    #[test]
    fn native_is_terminated((rope, model) in any_rope()) {
        let service = Arc::new(FinalizationService::with_batch(16));
        let s = RopeString::with_finalizer(rope, service);
        let native = s.to_native().unwrap();
        prop_assert!(native.capacity() >= model.len());
        prop_assert_eq!(native.get_byte(model.len()).unwrap(), 0);
        prop_assert_eq!(native.rope().bytes(), &model[..]);
        prop_assert_eq!(s.byte_pointer_size(), model.iter().position(|&b| b == 0).unwrap_or(model.len()));
    }
}
