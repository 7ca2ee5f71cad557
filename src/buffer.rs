/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::http1::Error;

/// Byte-sequence input buffer owned by the host. The parser only ever
/// reads `data()` and tells the host how much to `consume`; `prepare` and
/// `commit` belong to the host's read loop.
pub trait DynamicBuffer {
    fn data(&self) -> &[u8];

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Returns a writable region of exactly `n` bytes past the readable
    /// data.
    fn prepare(&mut self, n: usize) -> &mut [u8];

    /// Marks `n` prepared bytes as readable.
    fn commit(&mut self, n: usize);

    /// Discards `n` bytes from the front of the readable data.
    fn consume(&mut self, n: usize);
}

/// Contiguous growable implementation of `DynamicBuffer`.
pub struct BytesBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl BytesBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            end: 0,
        }
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            buf: vec![0; size],
            start: 0,
            end: 0,
        }
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl Default for BytesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicBuffer for BytesBuffer {
    fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn prepare(&mut self, n: usize) -> &mut [u8] {
        if self.buf.len() - self.end < n {
            // slide retained bytes to the front before growing
            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            if self.buf.len() - self.end < n {
                self.buf.resize(self.end + n, 0);
            }
        }

        &mut self.buf[self.end..self.end + n]
    }

    fn commit(&mut self, n: usize) {
        assert!(self.end + n <= self.buf.len());

        self.end += n;
    }

    fn consume(&mut self, n: usize) {
        assert!(self.start + n <= self.end);

        self.start += n;

        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }
}

/// Destination for body octets, owned by the host. `prepare` hands out a
/// writable region, `commit` accepts the bytes actually written, `finish`
/// seals the body when the message completes.
pub trait BodyReader {
    fn init(&mut self, content_length: Option<u64>) -> Result<(), Error>;

    fn prepare(&mut self, n: usize) -> Result<&mut [u8], Error>;

    fn commit(&mut self, n: usize) -> Result<(), Error>;

    fn finish(&mut self) -> Result<(), Error>;
}

/// Accumulates the body into a `Vec<u8>`.
pub struct VecReader {
    buf: Vec<u8>,
    len: usize,
}

impl VecReader {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);

        self.buf
    }
}

impl Default for VecReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyReader for VecReader {
    fn init(&mut self, content_length: Option<u64>) -> Result<(), Error> {
        if let Some(n) = content_length {
            let n = usize::try_from(n).map_err(|_| Error::BadContentLength)?;

            self.buf.reserve(n);
        }

        Ok(())
    }

    fn prepare(&mut self, n: usize) -> Result<&mut [u8], Error> {
        self.buf.resize(self.len + n, 0);

        Ok(&mut self.buf[self.len..self.len + n])
    }

    fn commit(&mut self, n: usize) -> Result<(), Error> {
        if self.buf.len() > self.len + n {
            self.buf.truncate(self.len + n);
        }

        self.len = self.buf.len();

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.buf.truncate(self.len);

        Ok(())
    }
}
