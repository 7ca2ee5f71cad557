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

/// Parse outcome codes. The numeric values are stable and intended for
/// interop; `NeedMore` is back-pressure rather than a failure, everything
/// else is fatal for the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u8)]
pub enum Error {
    #[error("more input needed")]
    NeedMore = 1,

    #[error("bad method")]
    BadMethod = 2,

    #[error("bad path")]
    BadPath = 3,

    #[error("bad version")]
    BadVersion = 4,

    #[error("bad status")]
    BadStatus = 5,

    #[error("bad reason")]
    BadReason = 6,

    #[error("bad field")]
    BadField = 7,

    #[error("bad value")]
    BadValue = 8,

    #[error("bad Content-Length")]
    BadContentLength = 9,

    #[error("bad Transfer-Encoding")]
    BadTransferEncoding = 10,

    #[error("bad chunk")]
    BadChunk = 11,

    #[error("unexpected end of message")]
    ShortRead = 12,
}

impl Error {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_fatal(self) -> bool {
        self != Error::NeedMore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_stable() {
        assert_eq!(Error::NeedMore.code(), 1);
        assert_eq!(Error::BadMethod.code(), 2);
        assert_eq!(Error::BadContentLength.code(), 9);
        assert_eq!(Error::ShortRead.code(), 12);
        assert!(!Error::NeedMore.is_fatal());
        assert!(Error::BadChunk.is_fatal());
    }

    #[test]
    fn test_messages() {
        assert_eq!(Error::NeedMore.to_string(), "more input needed");
        assert_eq!(Error::BadContentLength.to_string(), "bad Content-Length");
        assert_eq!(Error::ShortRead.to_string(), "unexpected end of message");
    }
}
