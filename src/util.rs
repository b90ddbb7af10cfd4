use std::ops::RangeFrom;

use nom::error::{make_error, ErrorKind, ParseError};
use nom::{Err, IResult, InputIter, InputLength, Parser, Slice};
use tinyvec::{Array, ArrayVec};

/// Like `nom::multi::many0` but collecting into a fixed capacity `ArrayVec`.
///
/// More items than the capacity is a `TooLarge` failure instead of a panic.
#[inline(always)]
pub fn many0<I, O, E, F, A>(mut f: F) -> impl FnMut(I) -> IResult<I, ArrayVec<A>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    E: ParseError<I>,
    A: Array<Item = O>,
{
    move |mut i: I| {
        let mut acc = ArrayVec::default();
        loop {
            let len = i.input_len();
            match f.parse(i.clone()) {
                Err(Err::Error(_)) => return Ok((i, acc)),
                Err(e) => return Err(e),
                Ok((i1, o)) => {
                    // infinite loop check: the parser must always consume
                    if i1.input_len() == len {
                        return Err(Err::Error(E::from_error_kind(i, ErrorKind::Many0)));
                    }

                    if acc.try_push(o).is_some() {
                        return Err(Err::Failure(E::from_error_kind(i, ErrorKind::TooLarge)));
                    }
                    i = i1;
                }
            }
        }
    }
}

/// Like [`many0`] but requires at least one item.
#[inline(always)]
pub fn many1<I, O, E, F, A>(f: F) -> impl FnMut(I) -> IResult<I, ArrayVec<A>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    E: ParseError<I>,
    A: Array<Item = O>,
{
    let mut inner = many0(f);
    move |i: I| {
        let (rest, acc) = inner(i.clone())?;
        if acc.is_empty() {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Many1)));
        }
        Ok((rest, acc))
    }
}

pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Append the low 48 bits of `value` big endian.
pub fn put_u48(output: &mut Vec<u8>, value: u64) {
    output.extend_from_slice(&value.to_be_bytes()[2..]);
}
