use super::encoding::{Ascii, Binary, ValueEncoding};
use super::key::{InvalidMetadataKey, MetadataKey};
use super::value::MetadataValue;
use std::fmt;
use std::marker::PhantomData;

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// A set of gRPC metadata entries: HTTP/2 headers and trailers minus the
/// handful of names gRPC itself reserves (`te`, `content-type`,
/// `grpc-message`, `grpc-message-type`, `grpc-status`).
///
/// Internally this is a thin wrapper around [`http::HeaderMap`]; the ascii
/// vs. binary (`-bin` suffix) split lives entirely in the type parameter of
/// [`MetadataKey`]/[`MetadataValue`], not in a separate storage map.
#[derive(Clone, Default)]
pub struct MetadataMap {
    headers: HeaderMap,
}

impl fmt::Debug for MetadataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataMap").field("headers", &self.headers).finish()
    }
}

impl MetadataMap {
    /// Header names gRPC reserves for its own framing; never iterated or
    /// settable through the public `MetadataMap` API.
    pub const GRPC_RESERVED_HEADERS: [HeaderName; 5] = [
        HeaderName::from_static("te"),
        HeaderName::from_static("content-type"),
        HeaderName::from_static("grpc-message"),
        HeaderName::from_static("grpc-message-type"),
        HeaderName::from_static("grpc-status"),
    ];

    /// Create an empty `MetadataMap`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Convert an HTTP `HeaderMap` to a `MetadataMap`.
    #[must_use]
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Convert a `MetadataMap` into an HTTP `HeaderMap`.
    #[must_use]
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Strips gRPC's own reserved headers (the fixed [`GRPC_RESERVED_HEADERS`](Self::GRPC_RESERVED_HEADERS)
    /// set, plus anything under the reserved `grpc-` prefix a caller may
    /// have inserted anyway) before a `MetadataMap` is written to the wire.
    ///
    /// Custom metadata is never allowed to begin with `grpc-`; this is the
    /// one place that invariant is enforced on write, covering request
    /// headers, response headers, and trailers alike.
    pub(crate) fn into_sanitized_headers(mut self) -> HeaderMap {
        for r in &Self::GRPC_RESERVED_HEADERS {
            self.headers.remove(r);
        }

        let reserved_prefixed: Vec<HeaderName> = self
            .headers
            .keys()
            .filter(|name| name.as_str().starts_with("grpc-"))
            .cloned()
            .collect();
        for name in reserved_prefixed {
            self.headers.remove(name);
        }

        self.headers
    }

    /// Merges `other`'s entries into `self`, keeping any entry already
    /// present under a given name and appending the rest.
    ///
    /// Used to fold headers observed earlier in a call (e.g. response
    /// headers) together with trailers discovered once the stream drains.
    pub fn merge(&mut self, other: MetadataMap) {
        let mut last_name: Option<HeaderName> = None;
        for (name, value) in other.headers {
            let name = match name {
                Some(name) => {
                    last_name = Some(name.clone());
                    name
                }
                // A `None` key means "same name as the previous entry" —
                // `HeaderMap`'s `IntoIter` only sets it once per name.
                None => last_name.clone().expect("HeaderMap always yields a name first"),
            };
            self.headers.append(name, value);
        }
    }

    /// Create an empty `MetadataMap` with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            headers: HeaderMap::with_capacity(capacity),
        }
    }

    /// Number of metadata entries (ascii and binary) stored in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Number of distinct keys stored in the map.
    #[must_use]
    pub fn keys_len(&self) -> usize {
        self.headers.keys_len()
    }

    /// Returns `true` if the map contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clears the map, keeping the allocated memory for reuse.
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Returns the number of entries the map can hold without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.headers.capacity()
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.headers.reserve(additional);
    }

    /// Returns the first ascii value associated with `key`. For binary keys
    /// (`-bin` suffix) use [`Self::get_bin`].
    pub fn get<K>(&self, key: K) -> Option<&MetadataValue<Ascii>>
    where
        K: AsMetadataKey<Ascii>,
    {
        key.get(self)
    }

    /// Like [`Self::get`], but for binary keys.
    pub fn get_bin<K>(&self, key: K) -> Option<&MetadataValue<Binary>>
    where
        K: AsMetadataKey<Binary>,
    {
        key.get(self)
    }

    /// Returns a mutable reference to the first ascii value for `key`.
    pub fn get_mut<K>(&mut self, key: K) -> Option<&mut MetadataValue<Ascii>>
    where
        K: AsMetadataKey<Ascii>,
    {
        key.get_mut(self)
    }

    /// Like [`Self::get_mut`], but for binary keys.
    pub fn get_bin_mut<K>(&mut self, key: K) -> Option<&mut MetadataValue<Binary>>
    where
        K: AsMetadataKey<Binary>,
    {
        key.get_mut(self)
    }

    /// Returns a view of all ascii values associated with `key`.
    pub fn get_all<K>(&self, key: K) -> GetAll<'_, Ascii>
    where
        K: AsMetadataKey<Ascii>,
    {
        GetAll {
            inner: key.get_all(self),
            phantom: PhantomData,
        }
    }

    /// Like [`Self::get_all`], but for binary keys.
    pub fn get_all_bin<K>(&self, key: K) -> GetAll<'_, Binary>
    where
        K: AsMetadataKey<Binary>,
    {
        GetAll {
            inner: key.get_all(self),
            phantom: PhantomData,
        }
    }

    /// Returns `true` if the map contains a value for `key`, ascii or binary.
    #[inline(always)]
    pub fn contains_key<K>(&self, key: &K) -> bool
    where
        K: AsEncodingAgnosticMetadataKey,
    {
        key.contains_key(self)
    }

    /// An iterator over all key-value pairs (ascii and binary).
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.headers.iter(),
        }
    }

    /// An iterator visiting all key-value pairs, with mutable value refs.
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut {
            inner: self.headers.iter_mut(),
        }
    }

    /// An iterator visiting all distinct keys.
    #[must_use]
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            inner: self.headers.keys(),
        }
    }

    /// An iterator visiting all values.
    #[must_use]
    pub fn values(&self) -> Values<'_> {
        Values {
            inner: self.headers.iter(),
        }
    }

    /// An iterator visiting all values mutably.
    pub fn values_mut(&mut self) -> ValuesMut<'_> {
        ValuesMut {
            inner: self.headers.iter_mut(),
        }
    }

    /// Gets `key`'s entry in the map for in-place manipulation. For binary
    /// keys, use [`Self::entry_bin`].
    pub fn entry<K>(&mut self, key: K) -> Result<Entry<'_, Ascii>, InvalidMetadataKey>
    where
        K: AsMetadataKey<Ascii>,
    {
        self.generic_entry::<Ascii, K>(key)
    }

    /// Like [`Self::entry`], but for binary keys.
    pub fn entry_bin<K>(&mut self, key: K) -> Result<Entry<'_, Binary>, InvalidMetadataKey>
    where
        K: AsMetadataKey<Binary>,
    {
        self.generic_entry::<Binary, K>(key)
    }

    fn generic_entry<VE: ValueEncoding, K>(
        &mut self,
        key: K,
    ) -> Result<Entry<'_, VE>, InvalidMetadataKey>
    where
        K: AsMetadataKey<VE>,
    {
        match key.entry(self) {
            Some(entry) => Ok(entry),
            None => Err(InvalidMetadataKey::new()),
        }
    }

    /// Inserts an ascii key-value pair, returning the previous first value
    /// associated with the key, if any.
    pub fn insert<K>(&mut self, key: K, val: MetadataValue<Ascii>) -> Option<MetadataValue<Ascii>>
    where
        K: IntoMetadataKey<Ascii>,
    {
        key.insert(self, val)
    }

    /// Like [`Self::insert`], but for binary keys.
    pub fn insert_bin<K>(
        &mut self,
        key: K,
        val: MetadataValue<Binary>,
    ) -> Option<MetadataValue<Binary>>
    where
        K: IntoMetadataKey<Binary>,
    {
        key.insert(self, val)
    }

    /// Appends an ascii value to the list of values for `key`, without
    /// replacing any existing entry. Returns `true` if `key` already existed.
    pub fn append<K>(&mut self, key: K, value: MetadataValue<Ascii>) -> bool
    where
        K: IntoMetadataKey<Ascii>,
    {
        key.append(self, value)
    }

    /// Like [`Self::append`], but for binary keys.
    pub fn append_bin<K>(&mut self, key: K, value: MetadataValue<Binary>) -> bool
    where
        K: IntoMetadataKey<Binary>,
    {
        key.append(self, value)
    }

    /// Removes all ascii values for `key`, returning the first one.
    pub fn remove<K>(&mut self, key: K) -> Option<MetadataValue<Ascii>>
    where
        K: AsMetadataKey<Ascii>,
    {
        key.remove(self)
    }

    /// Like [`Self::remove`], but for binary keys.
    pub fn remove_bin<K>(&mut self, key: K) -> Option<MetadataValue<Binary>>
    where
        K: AsMetadataKey<Binary>,
    {
        key.remove(self)
    }

}

impl From<MetadataMap> for HeaderMap {
    fn from(map: MetadataMap) -> Self {
        map.headers
    }
}

impl From<HeaderMap> for MetadataMap {
    fn from(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

/// A view of all values associated with a single key.
#[derive(Debug)]
pub struct GetAll<'a, VE: ValueEncoding> {
    inner: Option<http::header::GetAll<'a, HeaderValue>>,
    phantom: PhantomData<VE>,
}

impl<'a, VE: ValueEncoding> GetAll<'a, VE> {
    /// Returns an iterator visiting all values associated with the key.
    #[must_use]
    pub fn iter(&self) -> ValueIter<'a, VE> {
        ValueIter {
            inner: self.inner.as_ref().map(http::header::GetAll::iter),
            phantom: PhantomData,
        }
    }
}

impl<'a, VE: ValueEncoding> IntoIterator for GetAll<'a, VE> {
    type Item = &'a MetadataValue<VE>;
    type IntoIter = ValueIter<'a, VE>;

    fn into_iter(self) -> Self::IntoIter {
        ValueIter {
            inner: self.inner.map(IntoIterator::into_iter),
            phantom: PhantomData,
        }
    }
}

/// Iterator over the values associated with one key.
#[derive(Debug)]
pub struct ValueIter<'a, VE: ValueEncoding> {
    inner: Option<http::header::ValueIter<'a, HeaderValue>>,
    phantom: PhantomData<VE>,
}

impl<'a, VE: ValueEncoding> Iterator for ValueIter<'a, VE> {
    type Item = &'a MetadataValue<VE>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .as_mut()
            .and_then(Iterator::next)
            .map(MetadataValue::unchecked_from_header_value_ref)
    }
}

/// Iterator over all key-value pairs.
#[derive(Debug)]
pub struct Iter<'a> {
    inner: http::header::Iter<'a, HeaderValue>,
}

/// An ascii or binary reference to a metadata key.
#[derive(Debug)]
pub enum KeyRef<'a> {
    Ascii(&'a MetadataKey<Ascii>),
    Binary(&'a MetadataKey<Binary>),
}

/// An ascii or binary reference to a metadata value.
#[derive(Debug)]
pub enum ValueRef<'a> {
    Ascii(&'a MetadataValue<Ascii>),
    Binary(&'a MetadataValue<Binary>),
}

/// An ascii or binary mutable reference to a metadata value.
#[derive(Debug)]
pub enum ValueRefMut<'a> {
    Ascii(&'a mut MetadataValue<Ascii>),
    Binary(&'a mut MetadataValue<Binary>),
}

fn key_value_ref(header_name: &HeaderName, value: &HeaderValue) -> (KeyRef<'_>, ValueRef<'_>) {
    if header_name.as_str().ends_with("-bin") {
        let key = MetadataKey::<Binary>::unchecked_from_header_name_ref(header_name);
        let value = MetadataValue::<Binary>::unchecked_from_header_value_ref(value);
        (KeyRef::Binary(key), ValueRef::Binary(value))
    } else {
        let key = MetadataKey::<Ascii>::unchecked_from_header_name_ref(header_name);
        let value = MetadataValue::<Ascii>::unchecked_from_header_value_ref(value);
        (KeyRef::Ascii(key), ValueRef::Ascii(value))
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (KeyRef<'a>, ValueRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(name, value)| key_value_ref(name, value))
    }
}

/// Iterator over all key-value pairs with mutable value access.
#[derive(Debug)]
pub struct IterMut<'a> {
    inner: http::header::IterMut<'a, HeaderValue>,
}

impl<'a> Iterator for IterMut<'a> {
    type Item = (KeyRef<'a>, ValueRefMut<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(name, value)| {
            if name.as_str().ends_with("-bin") {
                let key = MetadataKey::<Binary>::unchecked_from_header_name_ref(name);
                let value = unsafe {
                    &mut *(value as *mut HeaderValue as *mut MetadataValue<Binary>)
                };
                (KeyRef::Binary(key), ValueRefMut::Binary(value))
            } else {
                let key = MetadataKey::<Ascii>::unchecked_from_header_name_ref(name);
                let value = unsafe {
                    &mut *(value as *mut HeaderValue as *mut MetadataValue<Ascii>)
                };
                (KeyRef::Ascii(key), ValueRefMut::Ascii(value))
            }
        })
    }
}

/// Iterator over all distinct keys.
#[derive(Debug)]
pub struct Keys<'a> {
    inner: http::header::Keys<'a, HeaderValue>,
}

impl<'a> Iterator for Keys<'a> {
    type Item = KeyRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|name| {
            if name.as_str().ends_with("-bin") {
                KeyRef::Binary(MetadataKey::unchecked_from_header_name_ref(name))
            } else {
                KeyRef::Ascii(MetadataKey::unchecked_from_header_name_ref(name))
            }
        })
    }
}

/// Iterator over all values.
#[derive(Debug)]
pub struct Values<'a> {
    inner: http::header::Iter<'a, HeaderValue>,
}

impl<'a> Iterator for Values<'a> {
    type Item = ValueRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(name, value)| key_value_ref(name, value).1)
    }
}

/// Iterator over all values, mutably.
#[derive(Debug)]
pub struct ValuesMut<'a> {
    inner: http::header::IterMut<'a, HeaderValue>,
}

impl<'a> Iterator for ValuesMut<'a> {
    type Item = ValueRefMut<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(name, value)| {
            if name.as_str().ends_with("-bin") {
                ValueRefMut::Binary(unsafe {
                    &mut *(value as *mut HeaderValue as *mut MetadataValue<Binary>)
                })
            } else {
                ValueRefMut::Ascii(unsafe {
                    &mut *(value as *mut HeaderValue as *mut MetadataValue<Ascii>)
                })
            }
        })
    }
}

/// A view into a single entry in a [`MetadataMap`], obtained from
/// [`MetadataMap::entry`] / [`MetadataMap::entry_bin`].
#[derive(Debug)]
pub enum Entry<'a, VE: ValueEncoding> {
    Occupied(OccupiedEntry<'a, VE>),
    Vacant(VacantEntry<'a, VE>),
}

/// An occupied entry, with at least one associated value.
#[derive(Debug)]
pub struct OccupiedEntry<'a, VE: ValueEncoding> {
    inner: http::header::OccupiedEntry<'a, HeaderValue>,
    phantom: PhantomData<VE>,
}

/// A vacant entry.
#[derive(Debug)]
pub struct VacantEntry<'a, VE: ValueEncoding> {
    inner: http::header::VacantEntry<'a, HeaderValue>,
    phantom: PhantomData<VE>,
}

impl<'a, VE: ValueEncoding> Entry<'a, VE> {
    /// Ensures a value is present, inserting `default` if the entry is
    /// vacant, and returns a mutable reference to it.
    pub fn or_insert(self, default: MetadataValue<VE>) -> &'a mut MetadataValue<VE> {
        match self {
            Self::Occupied(e) => e.into_mut(),
            Self::Vacant(e) => e.insert(default),
        }
    }

    /// Ensures a value is present, computing it from `default` if vacant.
    pub fn or_insert_with<F: FnOnce() -> MetadataValue<VE>>(
        self,
        default: F,
    ) -> &'a mut MetadataValue<VE> {
        match self {
            Self::Occupied(e) => e.into_mut(),
            Self::Vacant(e) => e.insert(default()),
        }
    }

    /// The key for this entry.
    #[must_use]
    pub fn key(&self) -> &MetadataKey<VE> {
        MetadataKey::unchecked_from_header_name_ref(match self {
            Self::Occupied(e) => e.inner.key(),
            Self::Vacant(e) => e.inner.key(),
        })
    }
}

impl<'a, VE: ValueEncoding> OccupiedEntry<'a, VE> {
    /// The key for this entry.
    #[must_use]
    pub fn key(&self) -> &MetadataKey<VE> {
        MetadataKey::unchecked_from_header_name_ref(self.inner.key())
    }

    /// Returns a reference to the first value.
    #[must_use]
    pub fn get(&self) -> &MetadataValue<VE> {
        MetadataValue::unchecked_from_header_value_ref(self.inner.get())
    }

    /// Returns the number of values associated with this key.
    #[must_use]
    pub fn iter(&self) -> ValueIter<'_, VE> {
        ValueIter {
            inner: Some(self.inner.iter()),
            phantom: PhantomData,
        }
    }

    /// Sets the first value, returning the previous one.
    pub fn insert(&mut self, value: MetadataValue<VE>) -> MetadataValue<VE> {
        MetadataValue::unchecked_from_header_value(self.inner.insert(value.inner))
    }

    /// Appends an additional value under this key.
    pub fn append(&mut self, value: MetadataValue<VE>) {
        self.inner.append(value.inner);
    }

    /// Converts into a mutable reference to the first value, tied to the
    /// lifetime of the map.
    #[must_use]
    pub fn into_mut(self) -> &'a mut MetadataValue<VE> {
        unsafe { &mut *(self.inner.into_mut() as *mut HeaderValue as *mut MetadataValue<VE>) }
    }

    /// Removes the entry, returning the first value.
    pub fn remove(self) -> MetadataValue<VE> {
        MetadataValue::unchecked_from_header_value(self.inner.remove())
    }
}

impl<'a, VE: ValueEncoding> VacantEntry<'a, VE> {
    /// The key for this vacant entry.
    #[must_use]
    pub fn key(&self) -> &MetadataKey<VE> {
        MetadataKey::unchecked_from_header_name_ref(self.inner.key())
    }

    /// Inserts a value, returning a mutable reference to it.
    pub fn insert(self, value: MetadataValue<VE>) -> &'a mut MetadataValue<VE> {
        unsafe {
            &mut *(self.inner.insert(value.inner) as *mut HeaderValue as *mut MetadataValue<VE>)
        }
    }
}

/// Values that can be used as a lookup key into a [`MetadataMap`].
pub trait AsMetadataKey<VE: ValueEncoding>: self::sealed::Sealed {
    #[doc(hidden)]
    fn get<'a>(&self, map: &'a MetadataMap) -> Option<&'a MetadataValue<VE>>;
    #[doc(hidden)]
    fn get_mut<'a>(&self, map: &'a mut MetadataMap) -> Option<&'a mut MetadataValue<VE>>;
    #[doc(hidden)]
    fn get_all<'a>(&self, map: &'a MetadataMap) -> Option<http::header::GetAll<'a, HeaderValue>>;
    #[doc(hidden)]
    fn entry<'a>(&self, map: &'a mut MetadataMap) -> Option<Entry<'a, VE>>;
    #[doc(hidden)]
    fn remove(&self, map: &mut MetadataMap) -> Option<MetadataValue<VE>>;
}

/// Values that can be used as a key to insert into a [`MetadataMap`].
pub trait IntoMetadataKey<VE: ValueEncoding>: self::sealed::Sealed {
    #[doc(hidden)]
    fn insert(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> Option<MetadataValue<VE>>;
    #[doc(hidden)]
    fn append(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> bool;
}

/// Values that can be checked for presence regardless of ascii/binary kind.
pub trait AsEncodingAgnosticMetadataKey: self::sealed::Sealed {
    #[doc(hidden)]
    fn contains_key(&self, map: &MetadataMap) -> bool;
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for str {}
    impl Sealed for String {}
    impl<'a> Sealed for &'a str {}
    impl<VE> Sealed for super::MetadataKey<VE> where VE: super::ValueEncoding {}
    impl<'a, VE> Sealed for &'a super::MetadataKey<VE> where VE: super::ValueEncoding {}
    impl Sealed for http::header::HeaderName {}
}

impl<VE: ValueEncoding> AsMetadataKey<VE> for MetadataKey<VE> {
    fn get<'a>(&self, map: &'a MetadataMap) -> Option<&'a MetadataValue<VE>> {
        map.headers
            .get(&self.inner)
            .map(MetadataValue::unchecked_from_header_value_ref)
    }

    fn get_mut<'a>(&self, map: &'a mut MetadataMap) -> Option<&'a mut MetadataValue<VE>> {
        map.headers.get_mut(&self.inner).map(|v| unsafe {
            &mut *(v as *mut HeaderValue as *mut MetadataValue<VE>)
        })
    }

    fn get_all<'a>(&self, map: &'a MetadataMap) -> Option<http::header::GetAll<'a, HeaderValue>> {
        if map.headers.contains_key(&self.inner) {
            Some(map.headers.get_all(&self.inner))
        } else {
            None
        }
    }

    fn entry<'a>(&self, map: &'a mut MetadataMap) -> Option<Entry<'a, VE>> {
        Some(match map.headers.entry(self.inner.clone()) {
            http::header::Entry::Occupied(inner) => Entry::Occupied(OccupiedEntry {
                inner,
                phantom: PhantomData,
            }),
            http::header::Entry::Vacant(inner) => Entry::Vacant(VacantEntry {
                inner,
                phantom: PhantomData,
            }),
        })
    }

    fn remove(&self, map: &mut MetadataMap) -> Option<MetadataValue<VE>> {
        map.headers
            .remove(&self.inner)
            .map(MetadataValue::unchecked_from_header_value)
    }
}

impl<'a, VE: ValueEncoding> AsMetadataKey<VE> for &'a MetadataKey<VE> {
    fn get<'m>(&self, map: &'m MetadataMap) -> Option<&'m MetadataValue<VE>> {
        (*self).get(map)
    }

    fn get_mut<'m>(&self, map: &'m mut MetadataMap) -> Option<&'m mut MetadataValue<VE>> {
        (*self).get_mut(map)
    }

    fn get_all<'m>(&self, map: &'m MetadataMap) -> Option<http::header::GetAll<'m, HeaderValue>> {
        (*self).get_all(map)
    }

    fn entry<'m>(&self, map: &'m mut MetadataMap) -> Option<Entry<'m, VE>> {
        (*self).entry(map)
    }

    fn remove(&self, map: &mut MetadataMap) -> Option<MetadataValue<VE>> {
        (*self).remove(map)
    }
}

impl<VE: ValueEncoding> AsMetadataKey<VE> for str {
    fn get<'a>(&self, map: &'a MetadataMap) -> Option<&'a MetadataValue<VE>> {
        if !VE::is_valid_key(self) {
            return None;
        }
        map.headers
            .get(self)
            .map(MetadataValue::unchecked_from_header_value_ref)
    }

    fn get_mut<'a>(&self, map: &'a mut MetadataMap) -> Option<&'a mut MetadataValue<VE>> {
        if !VE::is_valid_key(self) {
            return None;
        }
        map.headers.get_mut(self).map(|v| unsafe {
            &mut *(v as *mut HeaderValue as *mut MetadataValue<VE>)
        })
    }

    fn get_all<'a>(&self, map: &'a MetadataMap) -> Option<http::header::GetAll<'a, HeaderValue>> {
        if !VE::is_valid_key(self) || !map.headers.contains_key(self) {
            return None;
        }
        Some(map.headers.get_all(self))
    }

    fn entry<'a>(&self, map: &'a mut MetadataMap) -> Option<Entry<'a, VE>> {
        if !VE::is_valid_key(self) {
            return None;
        }
        let name = HeaderName::from_bytes(self.as_bytes()).ok()?;
        Some(match map.headers.entry(name) {
            http::header::Entry::Occupied(inner) => Entry::Occupied(OccupiedEntry {
                inner,
                phantom: PhantomData,
            }),
            http::header::Entry::Vacant(inner) => Entry::Vacant(VacantEntry {
                inner,
                phantom: PhantomData,
            }),
        })
    }

    fn remove(&self, map: &mut MetadataMap) -> Option<MetadataValue<VE>> {
        if !VE::is_valid_key(self) {
            return None;
        }
        map.headers
            .remove(self)
            .map(MetadataValue::unchecked_from_header_value)
    }
}

impl<VE: ValueEncoding> AsMetadataKey<VE> for String {
    fn get<'a>(&self, map: &'a MetadataMap) -> Option<&'a MetadataValue<VE>> {
        self.as_str().get(map)
    }

    fn get_mut<'a>(&self, map: &'a mut MetadataMap) -> Option<&'a mut MetadataValue<VE>> {
        self.as_str().get_mut(map)
    }

    fn get_all<'a>(&self, map: &'a MetadataMap) -> Option<http::header::GetAll<'a, HeaderValue>> {
        self.as_str().get_all(map)
    }

    fn entry<'a>(&self, map: &'a mut MetadataMap) -> Option<Entry<'a, VE>> {
        self.as_str().entry(map)
    }

    fn remove(&self, map: &mut MetadataMap) -> Option<MetadataValue<VE>> {
        self.as_str().remove(map)
    }
}

impl<VE: ValueEncoding> IntoMetadataKey<VE> for MetadataKey<VE> {
    fn insert(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> Option<MetadataValue<VE>> {
        map.headers
            .insert(self.inner, val.inner)
            .map(MetadataValue::unchecked_from_header_value)
    }

    fn append(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> bool {
        map.headers.append(self.inner, val.inner)
    }
}

impl<'a, VE: ValueEncoding> IntoMetadataKey<VE> for &'a MetadataKey<VE> {
    fn insert(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> Option<MetadataValue<VE>> {
        map.headers
            .insert(self.inner.clone(), val.inner)
            .map(MetadataValue::unchecked_from_header_value)
    }

    fn append(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> bool {
        map.headers.append(self.inner.clone(), val.inner)
    }
}

impl<VE: ValueEncoding> IntoMetadataKey<VE> for &str {
    fn insert(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> Option<MetadataValue<VE>> {
        let key = MetadataKey::<VE>::from_bytes(self.as_bytes()).expect("invalid metadata key");
        key.insert(map, val)
    }

    fn append(self, map: &mut MetadataMap, val: MetadataValue<VE>) -> bool {
        let key = MetadataKey::<VE>::from_bytes(self.as_bytes()).expect("invalid metadata key");
        key.append(map, val)
    }
}

impl AsEncodingAgnosticMetadataKey for str {
    fn contains_key(&self, map: &MetadataMap) -> bool {
        map.headers.contains_key(self)
    }
}

impl AsEncodingAgnosticMetadataKey for String {
    fn contains_key(&self, map: &MetadataMap) -> bool {
        map.headers.contains_key(self.as_str())
    }
}

impl<VE: ValueEncoding> AsEncodingAgnosticMetadataKey for MetadataKey<VE> {
    fn contains_key(&self, map: &MetadataMap) -> bool {
        map.headers.contains_key(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_ascii() {
        let mut map = MetadataMap::new();
        map.insert("x-custom", MetadataValue::from_static("hello"));
        assert_eq!(map.get("x-custom").unwrap().to_str().unwrap(), "hello");
    }

    #[test]
    fn insert_get_binary() {
        let mut map = MetadataMap::new();
        map.insert_bin("x-custom-bin", MetadataValue::from_bytes(b"hi"));
        assert_eq!(map.get_bin("x-custom-bin").unwrap().to_bytes().unwrap(), b"hi");
    }

    #[test]
    fn append_keeps_both_values() {
        let mut map = MetadataMap::new();
        map.append("x-multi", MetadataValue::from_static("a"));
        map.append("x-multi", MetadataValue::from_static("b"));
        assert_eq!(map.get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn sanitize_strips_reserved_headers() {
        let mut map = MetadataMap::new();
        map.headers.insert(
            HeaderName::from_static("grpc-status"),
            HeaderValue::from_static("0"),
        );
        map.insert("x-custom", MetadataValue::from_static("kept"));
        let headers = map.into_sanitized_headers();
        assert!(!headers.contains_key("grpc-status"));
        assert!(headers.contains_key("x-custom"));
    }

    #[test]
    fn sanitize_strips_grpc_prefixed_custom_headers() {
        let mut map = MetadataMap::new();
        // A caller-inserted key under the reserved `grpc-` prefix that
        // isn't one of the fixed `GRPC_RESERVED_HEADERS` names.
        map.headers.insert(
            HeaderName::from_static("grpc-foo"),
            HeaderValue::from_static("bar"),
        );
        map.insert("x-custom", MetadataValue::from_static("kept"));
        let headers = map.into_sanitized_headers();
        assert!(!headers.contains_key("grpc-foo"));
        assert!(headers.contains_key("x-custom"));
    }

    #[test]
    fn remove_then_get_is_none() {
        let mut map = MetadataMap::new();
        map.insert("x-custom", MetadataValue::from_static("hello"));
        map.remove("x-custom");
        assert!(map.get("x-custom").is_none());
    }
}
