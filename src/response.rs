use crate::metadata::MetadataMap;

/// A gRPC response: a message plus the metadata (headers and, once the call
/// has resolved, trailers folded in) that travelled alongside it.
#[derive(Debug)]
pub struct Response<T> {
    metadata: MetadataMap,
    message: T,
    extensions: http::Extensions,
}

impl<T> Response<T> {
    /// Wraps `message` in a `Response` with empty metadata.
    pub fn new(message: T) -> Self {
        Self {
            metadata: MetadataMap::new(),
            message,
            extensions: http::Extensions::new(),
        }
    }

    /// A reference to the wrapped message.
    pub fn get_ref(&self) -> &T {
        &self.message
    }

    /// A mutable reference to the wrapped message.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.message
    }

    /// This response's metadata (response headers, merged with trailers once
    /// the call has fully resolved).
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable access to this response's metadata.
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// A reference to the response's extensions.
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    /// Mutable access to the response's extensions.
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    /// Consumes `self`, returning the wrapped message.
    pub fn into_inner(self) -> T {
        self.message
    }

    /// Consumes `self`, returning its parts.
    pub fn into_parts(self) -> (MetadataMap, T, http::Extensions) {
        (self.metadata, self.message, self.extensions)
    }

    /// Builds a `Response` from its constituent parts.
    pub fn from_parts(metadata: MetadataMap, message: T, extensions: http::Extensions) -> Self {
        Self {
            metadata,
            message,
            extensions,
        }
    }

    /// Converts an `http::Response` into a gRPC response, taking its headers
    /// as metadata.
    pub fn from_http(http: http::Response<T>) -> Self {
        let (parts, message) = http.into_parts();
        Self {
            metadata: MetadataMap::from_headers(parts.headers),
            message,
            extensions: parts.extensions,
        }
    }

    #[doc(hidden)]
    pub fn map<F, U>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            metadata: self.metadata,
            message: f(self.message),
            extensions: self.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_parts() {
        let response = Response::new(42);
        let (metadata, message, extensions) = response.into_parts();
        let rebuilt = Response::from_parts(metadata, message, extensions);
        assert_eq!(*rebuilt.get_ref(), 42);
    }
}
