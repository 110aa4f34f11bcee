/*!
 * Secret category catalog and random material generation
 *
 * This module defines the fixed catalog of secret categories, the named
 * secrets each category owns, and the cryptographically secure generation
 * of their values.
 */

mod catalog;

pub use catalog::*;
