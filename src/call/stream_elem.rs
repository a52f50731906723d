/// A positioned stream element: whether a decoded message is known to be
/// the last one in its direction, and if so, what terminal metadata came
/// with it.
///
/// HTTP/2's END_STREAM flag can ride on the DATA frame carrying the last
/// message (`FinalElem`), or arrive on a subsequent, otherwise-empty HEADERS
/// frame (`Elem` followed later by `NoMoreElems`) — callers must tolerate
/// either shape, never assume one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamElem<A, B> {
    /// An element that either isn't final, or whose finality wasn't known
    /// at the time it was produced.
    Elem(A),
    /// The final element of this direction, paired with the terminal
    /// metadata (trailers) that arrived alongside it.
    FinalElem(A, B),
    /// No further elements — either the direction held none at all (an
    /// empty server-streaming response), or the last `Elem` already
    /// yielded turned out, only in hindsight, to have been the last one.
    NoMoreElems(B),
}

impl<A, B> StreamElem<A, B> {
    /// The element this variant carries, if any.
    #[must_use]
    pub fn element(&self) -> Option<&A> {
        match self {
            Self::Elem(a) | Self::FinalElem(a, _) => Some(a),
            Self::NoMoreElems(_) => None,
        }
    }

    /// Consumes `self`, returning the element it carries, if any.
    #[must_use]
    pub fn into_element(self) -> Option<A> {
        match self {
            Self::Elem(a) | Self::FinalElem(a, _) => Some(a),
            Self::NoMoreElems(_) => None,
        }
    }

    /// The terminal metadata this variant carries, if this is the last
    /// variant observable on this side.
    #[must_use]
    pub fn terminal_metadata(&self) -> Option<&B> {
        match self {
            Self::FinalElem(_, b) | Self::NoMoreElems(b) => Some(b),
            Self::Elem(_) => None,
        }
    }

    /// Whether this variant marks the end of the stream in this direction —
    /// i.e. no further `StreamElem` may be observed afterward.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Elem(_))
    }

    /// Transforms the carried element, leaving any terminal metadata alone.
    pub fn map_elem<C>(self, f: impl FnOnce(A) -> C) -> StreamElem<C, B> {
        match self {
            Self::Elem(a) => StreamElem::Elem(f(a)),
            Self::FinalElem(a, b) => StreamElem::FinalElem(f(a), b),
            Self::NoMoreElems(b) => StreamElem::NoMoreElems(b),
        }
    }

    /// Transforms the terminal metadata, leaving any carried element alone.
    pub fn map_meta<C>(self, f: impl FnOnce(B) -> C) -> StreamElem<A, C> {
        match self {
            Self::Elem(a) => StreamElem::Elem(a),
            Self::FinalElem(a, b) => StreamElem::FinalElem(a, f(b)),
            Self::NoMoreElems(b) => StreamElem::NoMoreElems(f(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elem_is_not_terminal() {
        let e: StreamElem<i32, ()> = StreamElem::Elem(1);
        assert!(!e.is_terminal());
        assert_eq!(e.element(), Some(&1));
        assert_eq!(e.terminal_metadata(), None);
    }

    #[test]
    fn final_elem_carries_both() {
        let e = StreamElem::FinalElem(1, "trailers");
        assert!(e.is_terminal());
        assert_eq!(e.element(), Some(&1));
        assert_eq!(e.terminal_metadata(), Some(&"trailers"));
    }

    #[test]
    fn no_more_elems_carries_only_metadata() {
        let e: StreamElem<i32, &str> = StreamElem::NoMoreElems("trailers");
        assert!(e.is_terminal());
        assert_eq!(e.element(), None);
        assert_eq!(e.terminal_metadata(), Some(&"trailers"));
    }

    #[test]
    fn map_elem_leaves_metadata_alone() {
        let e = StreamElem::FinalElem(1, "meta").map_elem(|a| a + 1);
        assert_eq!(e, StreamElem::FinalElem(2, "meta"));
    }
}
