// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Scenario tests exercising the driver engines end to end against
//! simulated hardware. The register-level unit tests live next to the
//! code they cover; everything here goes through the public API only.


mod spi;
