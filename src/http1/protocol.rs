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

use crate::buffer::{BodyReader, DynamicBuffer};
use crate::http1::parse::{self, Cursor, FieldLine};
use crate::http1::Error;
use log::trace;
use std::cmp;
use std::str;

const CONTENT_LENGTH: u8 = 0x01;
const CHUNKED: u8 = 0x02;
const HEADER: u8 = 0x04;
const DONE: u8 = 0x08;
const EXPECT_CRLF: u8 = 0x10;
const FINAL_CHUNK: u8 = 0x20;

// reserved for header-only parsing, no behavior yet
#[allow(dead_code)]
const SKIP_BODY: u8 = 0x40;

/// Events common to requests and responses. String arguments borrow from
/// the caller's input (or the parser's flatten scratch) and must not be
/// retained past the enclosing `write` call.
pub trait Observer {
    fn on_field(&mut self, name: &str, value: &[u8]) -> Result<(), Error>;

    fn on_header(&mut self) -> Result<(), Error>;

    fn on_chunk(&mut self, _size: u64, _ext: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn on_chunk_data(&mut self, _data: &[u8]) -> Result<(), Error> {
        Ok(())
    }
}

pub trait RequestObserver: Observer {
    /// Version is 10*major + minor, so HTTP/1.1 is 11.
    fn on_request(&mut self, method: &str, target: &[u8], version: u8) -> Result<(), Error>;
}

pub trait ResponseObserver: Observer {
    fn on_response(&mut self, status: u16, reason: &[u8], version: u8) -> Result<(), Error>;
}

struct State {
    flags: u8,

    // bytes still owed for the current body or chunk. MAX means no limit
    // known (close-delimited)
    len: u64,

    // resume terminator search from here; the prefix below it is proven
    // terminator-free, modulo the straddle tail
    skip: usize,

    failed: Option<Error>,
}

impl State {
    fn new() -> Self {
        Self {
            flags: 0,
            len: u64::MAX,
            skip: 0,
            failed: None,
        }
    }

    fn done(&self) -> bool {
        self.flags & DONE != 0
    }

    fn have_header(&self) -> bool {
        self.flags & HEADER != 0
    }

    fn is_chunked(&self) -> bool {
        self.flags & CHUNKED != 0
    }

    fn needs_eof(&self) -> bool {
        self.flags & (CONTENT_LENGTH | CHUNKED) == 0
    }

    fn content_length(&self) -> Option<u64> {
        if self.flags & CONTENT_LENGTH != 0 {
            Some(self.len)
        } else {
            None
        }
    }

    // bytes owed for the current chunk or body. when framing is unknown
    // this is a suggested read window, not a byte count
    fn remain(&self) -> u64 {
        if self.flags & (CONTENT_LENGTH | CHUNKED) != 0 {
            self.len
        } else {
            65536
        }
    }

    fn check(&self) -> Result<(), Error> {
        match self.failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, e: Error) -> Error {
        if e.is_fatal() {
            self.failed = Some(e);
        }
        e
    }

    fn find_header_end(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let search = buf.get(self.skip..).unwrap_or(b"");

        match parse::find_2x_crlf(search) {
            Some(i) => {
                let at = self.skip + i;
                self.skip = 0;
                Ok(at)
            }
            None => {
                self.skip = cmp::max(self.skip, buf.len().saturating_sub(3));
                Err(Error::NeedMore)
            }
        }
    }

    fn write_message<O, F>(&mut self, buf: &[u8], obs: &mut O, start_line: F) -> Result<usize, Error>
    where
        O: Observer,
        F: FnOnce(&mut Cursor<'_>, &mut O) -> Result<(), Error>,
    {
        if self.done() {
            return Ok(0);
        }

        if !self.have_header() {
            let term = self.find_header_end(buf)?;
            let block = &buf[..term + 4];

            let mut cur = Cursor::new(block);
            start_line(&mut cur, obs)?;

            let next = self.parse_fields(block, cur.pos(), obs, false)?;
            debug_assert_eq!(next, block.len());

            self.flags |= HEADER;

            if self.flags & CHUNKED != 0 {
                // no chunk is open yet
                self.len = 0;
            } else if self.flags & CONTENT_LENGTH == 0 {
                self.len = u64::MAX;
            } else if self.len == 0 {
                self.flags |= DONE;
            }

            obs.on_header()?;

            trace!(
                "header complete: chunked={} content_length={:?}",
                self.is_chunked(),
                self.content_length()
            );

            return Ok(block.len());
        }

        if self.is_chunked() {
            return self.parse_chunked(buf, obs);
        }

        // length-known and close-delimited bodies transfer via write_body
        Ok(0)
    }

    fn parse_fields<O: Observer>(
        &mut self,
        block: &[u8],
        mut pos: usize,
        obs: &mut O,
        trailer: bool,
    ) -> Result<usize, Error> {
        loop {
            match parse::parse_field_line(block, pos)? {
                FieldLine::End { next } => return Ok(next),
                FieldLine::Field { name, value, next } => {
                    // trailer fields never alter framing
                    if !trailer {
                        self.apply_field(name, value)?;
                    }

                    obs.on_field(name, value)?;
                    pos = next;
                }
            }
        }
    }

    fn apply_field(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        if name.eq_ignore_ascii_case("Content-Length") {
            if self.flags & (CONTENT_LENGTH | CHUNKED) != 0 {
                return Err(Error::BadContentLength);
            }

            let v = parse::parse_dec(value).ok_or(Error::BadContentLength)?;

            self.len = v;
            self.flags |= CONTENT_LENGTH;
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            if self.flags & (CONTENT_LENGTH | CHUNKED) != 0 {
                return Err(Error::BadTransferEncoding);
            }

            // chunked must be the final coding if it appears at all
            let mut chunked_seen = false;
            let mut chunked_last = false;

            for part in value.split(|&b| b == b',') {
                chunked_last = parse::trim_ows(part).eq_ignore_ascii_case(b"chunked");
                chunked_seen |= chunked_last;
            }

            if chunked_seen && !chunked_last {
                return Err(Error::BadTransferEncoding);
            }

            if chunked_last {
                self.flags |= CHUNKED;
            }
        }

        Ok(())
    }

    fn parse_chunked<O: Observer>(&mut self, buf: &[u8], obs: &mut O) -> Result<usize, Error> {
        if self.len > 0 {
            // the current chunk is not drained yet; data moves via write_body
            return Ok(0);
        }

        // the CRLF closing the previous chunk's data prefixes the next size
        // line
        let lead: usize = if self.flags & EXPECT_CRLF != 0 { 2 } else { 0 };

        if self.flags & FINAL_CHUNK == 0 {
            let start = cmp::max(self.skip, lead);
            let search = buf.get(start..).unwrap_or(b"");

            let term = match parse::find_crlf(search) {
                Some(i) => start + i,
                None => {
                    self.skip = cmp::max(self.skip, buf.len().saturating_sub(1));
                    return Err(Error::NeedMore);
                }
            };

            let mut cur = Cursor::new(&buf[..term]);
            if lead == 2 && !cur.crlf() {
                return Err(Error::BadChunk);
            }

            let size = cur.hex().ok_or(Error::BadChunk)?;

            let ext = &buf[cur.pos()..term];
            if !ext.is_empty() && ext[0] != b';' {
                return Err(Error::BadChunk);
            }

            if size > 0 {
                obs.on_chunk(size, ext)?;

                self.len = size;
                self.flags |= EXPECT_CRLF;
                self.skip = 0;

                return Ok(term + 2);
            }

            // last chunk: leave the size line unconsumed and parse it again
            // below together with the trailer, so the terminator search
            // covers the empty-trailer case
            self.flags |= FINAL_CHUNK;
            self.skip = 0;
        }

        let search = buf.get(self.skip..).unwrap_or(b"");

        let term = match parse::find_2x_crlf(search) {
            Some(i) => self.skip + i,
            None => {
                self.skip = cmp::max(self.skip, buf.len().saturating_sub(3));
                return Err(Error::NeedMore);
            }
        };

        let block = &buf[..term + 4];

        let mut cur = Cursor::new(block);
        if lead == 2 && !cur.crlf() {
            return Err(Error::BadChunk);
        }

        let size = cur.hex().ok_or(Error::BadChunk)?;
        if size != 0 {
            return Err(Error::BadChunk);
        }

        let line_end = cur.pos() + parse::find_crlf(&block[cur.pos()..]).ok_or(Error::BadChunk)?;

        let ext = &block[cur.pos()..line_end];
        if !ext.is_empty() && ext[0] != b';' {
            return Err(Error::BadChunk);
        }

        obs.on_chunk(0, ext)?;

        let next = self.parse_fields(block, line_end + 2, obs, true)?;
        debug_assert_eq!(next, block.len());

        self.flags |= DONE;
        self.flags &= !EXPECT_CRLF;
        self.skip = 0;

        trace!("message complete");

        Ok(block.len())
    }

    fn consume_body(&mut self, n: u64) {
        if self.flags & (CONTENT_LENGTH | CHUNKED) != 0 {
            assert!(n <= self.len);

            self.len -= n;

            if self.flags & CONTENT_LENGTH != 0 && self.len == 0 {
                self.flags |= DONE;

                trace!("message complete");
            }
        }
    }

    fn write_eof(&mut self) -> Result<(), Error> {
        if self.done() {
            return Ok(());
        }

        if !self.have_header() || self.flags & (CONTENT_LENGTH | CHUNKED) != 0 {
            return Err(Error::ShortRead);
        }

        self.flags |= DONE;

        trace!("message complete at eof");

        Ok(())
    }
}

// single segments are viewed in place; multiple segments are copied once
// into the retained scratch, which grows monotonically
fn flatten<'a>(scratch: &'a mut Vec<u8>, src: &[&'a [u8]]) -> &'a [u8] {
    match *src {
        [one] => one,
        _ => {
            scratch.clear();

            for seg in src {
                scratch.extend_from_slice(seg);
            }

            scratch
        }
    }
}

fn write_body_inner<R, B>(state: &mut State, r: &mut R, dynbuf: &mut B) -> Result<(), Error>
where
    R: BodyReader,
    B: DynamicBuffer,
{
    assert!(state.have_header());

    if state.done() {
        return Ok(());
    }

    let n = cmp::min(state.len, dynbuf.data().len() as u64) as usize;
    if n == 0 {
        return Ok(());
    }

    let dest = r.prepare(n)?;
    dest[..n].copy_from_slice(&dynbuf.data()[..n]);
    r.commit(n)?;

    dynbuf.consume(n);
    state.consume_body(n as u64);

    Ok(())
}

fn parse_request_line<'a>(cur: &mut Cursor<'a>) -> Result<(&'a str, &'a [u8], u8), Error> {
    let method = cur.token(&parse::TCHAR).ok_or(Error::BadMethod)?;
    let target = cur.token(&parse::VISIBLE).ok_or(Error::BadPath)?;
    let version = cur.version().ok_or(Error::BadVersion)?;

    if !cur.crlf() {
        return Err(Error::BadVersion);
    }

    // token characters are always ASCII
    Ok((str::from_utf8(method).unwrap(), target, version))
}

fn parse_status_line<'a>(cur: &mut Cursor<'a>) -> Result<(u16, &'a [u8], u8), Error> {
    let version = cur.version().ok_or(Error::BadVersion)?;

    if !cur.expect(b' ') {
        return Err(Error::BadVersion);
    }

    let status = cur.status().ok_or(Error::BadStatus)?;

    if !cur.expect(b' ') {
        return Err(Error::BadStatus);
    }

    let reason = cur.reason().ok_or(Error::BadReason)?;

    // the grammar permits an empty reason but downstream expects a
    // non-empty slice
    if reason.is_empty() {
        return Err(Error::BadReason);
    }

    if !cur.crlf() {
        return Err(Error::BadReason);
    }

    Ok((status, reason, version))
}

/// Parses one request. Created bound to exactly one message; reuse is not
/// supported.
pub struct RequestParser<O> {
    state: State,
    flatten_buf: Vec<u8>,
    obs: O,
}

impl<O: RequestObserver> RequestParser<O> {
    pub fn new(obs: O) -> Self {
        Self {
            state: State::new(),
            flatten_buf: Vec::new(),
            obs,
        }
    }

    /// Feeds header or chunk-framing bytes. Returns the count consumed, or
    /// `NeedMore` (consuming nothing) when the needed terminator is not in
    /// the window yet. Body octets transfer via `write_body`, not here.
    pub fn write(&mut self, src: &[&[u8]]) -> Result<usize, Error> {
        self.state.check()?;

        let buf = flatten(&mut self.flatten_buf, src);

        let state = &mut self.state;
        let obs = &mut self.obs;

        let r = state.write_message(buf, obs, |cur, obs| {
            let (method, target, version) = parse_request_line(cur)?;
            obs.on_request(method, target, version)
        });

        r.map_err(|e| state.fail(e))
    }

    pub fn write_slice(&mut self, src: &[u8]) -> Result<usize, Error> {
        self.write(&[src])
    }

    /// Copies up to `remain()` body octets from `dynbuf` into the reader.
    pub fn write_body<R, B>(&mut self, r: &mut R, dynbuf: &mut B) -> Result<(), Error>
    where
        R: BodyReader,
        B: DynamicBuffer,
    {
        self.state.check()?;

        let res = write_body_inner(&mut self.state, r, dynbuf);

        res.map_err(|e| self.state.fail(e))
    }

    /// Indicates end of stream. An error if a length- or chunk-bounded body
    /// is still owed bytes.
    pub fn write_eof(&mut self) -> Result<(), Error> {
        self.state.check()?;

        let res = self.state.write_eof();

        res.map_err(|e| self.state.fail(e))
    }

    /// The host read `n` body octets directly into its own sink.
    pub fn consume(&mut self, n: u64) {
        self.state.consume_body(n);
    }

    pub fn done(&self) -> bool {
        self.state.done()
    }

    pub fn have_header(&self) -> bool {
        self.state.have_header()
    }

    pub fn is_chunked(&self) -> bool {
        self.state.is_chunked()
    }

    /// Remaining Content-Length, if one was declared.
    pub fn content_length(&self) -> Option<u64> {
        self.state.content_length()
    }

    /// Bytes owed for the current chunk or body. When framing is unknown
    /// this is a suggested read window, not a byte count.
    pub fn remain(&self) -> u64 {
        self.state.remain()
    }

    /// Whether only connection close can delimit the message.
    pub fn needs_eof(&self) -> bool {
        self.state.needs_eof()
    }

    pub fn observer(&self) -> &O {
        &self.obs
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.obs
    }

    pub fn into_observer(self) -> O {
        self.obs
    }
}

/// Parses one response. Created bound to exactly one message; reuse is not
/// supported.
pub struct ResponseParser<O> {
    state: State,
    flatten_buf: Vec<u8>,
    obs: O,
}

impl<O: ResponseObserver> ResponseParser<O> {
    pub fn new(obs: O) -> Self {
        Self {
            state: State::new(),
            flatten_buf: Vec::new(),
            obs,
        }
    }

    /// Feeds header or chunk-framing bytes. Returns the count consumed, or
    /// `NeedMore` (consuming nothing) when the needed terminator is not in
    /// the window yet. Body octets transfer via `write_body`, not here.
    pub fn write(&mut self, src: &[&[u8]]) -> Result<usize, Error> {
        self.state.check()?;

        let buf = flatten(&mut self.flatten_buf, src);

        let state = &mut self.state;
        let obs = &mut self.obs;

        let r = state.write_message(buf, obs, |cur, obs| {
            let (status, reason, version) = parse_status_line(cur)?;
            obs.on_response(status, reason, version)
        });

        r.map_err(|e| state.fail(e))
    }

    pub fn write_slice(&mut self, src: &[u8]) -> Result<usize, Error> {
        self.write(&[src])
    }

    /// Copies up to `remain()` body octets from `dynbuf` into the reader.
    pub fn write_body<R, B>(&mut self, r: &mut R, dynbuf: &mut B) -> Result<(), Error>
    where
        R: BodyReader,
        B: DynamicBuffer,
    {
        self.state.check()?;

        let res = write_body_inner(&mut self.state, r, dynbuf);

        res.map_err(|e| self.state.fail(e))
    }

    /// Indicates end of stream. Close-delimited bodies complete here; an
    /// error if a length- or chunk-bounded body is still owed bytes.
    pub fn write_eof(&mut self) -> Result<(), Error> {
        self.state.check()?;

        let res = self.state.write_eof();

        res.map_err(|e| self.state.fail(e))
    }

    /// The host read `n` body octets directly into its own sink.
    pub fn consume(&mut self, n: u64) {
        self.state.consume_body(n);
    }

    pub fn done(&self) -> bool {
        self.state.done()
    }

    pub fn have_header(&self) -> bool {
        self.state.have_header()
    }

    pub fn is_chunked(&self) -> bool {
        self.state.is_chunked()
    }

    /// Remaining Content-Length, if one was declared.
    pub fn content_length(&self) -> Option<u64> {
        self.state.content_length()
    }

    /// Bytes owed for the current chunk or body. When framing is unknown
    /// this is a suggested read window, not a byte count.
    pub fn remain(&self) -> u64 {
        self.state.remain()
    }

    /// Whether only connection close can delimit the message.
    pub fn needs_eof(&self) -> bool {
        self.state.needs_eof()
    }

    pub fn observer(&self) -> &O {
        &self.obs
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.obs
    }

    pub fn into_observer(self) -> O {
        self.obs
    }
}
