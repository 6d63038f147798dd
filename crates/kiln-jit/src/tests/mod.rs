/*! Unit tests that need real compiled modules.
 *
 * `helpers` builds a few small modules shared by the layer tests; `engine_tests` drives the
 * engine through its crate-internal state, which the integration tests cannot see.
 */

pub(crate) mod helpers;
