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

//! Incremental HTTP/1.1 message parser. The parser consumes byte fragments
//! pushed by the caller, advances an internal state machine, and surfaces
//! parse events to a caller-supplied observer. Socket I/O, buffer policy,
//! and body storage belong to the host.

pub mod buffer;
pub mod http1;
