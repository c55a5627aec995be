//! The supplemented virtual/atom dependency-name resolution chain (spec
//! `SPEC_FULL.md` section C.2): up to three indirections — `virtual?`
//! alias lookup, version-constrained atom stripping, then a bare-name
//! normalization — before a dependency token is treated as unresolved.

use std::collections::HashMap;

use nbuild_metahelper::NameNormalizer;
use nbuild_types::Package;

const MAX_INDIRECTIONS: usize = 3;

/// Resolves `name` against `pkgs` (the atom it must ultimately land in)
/// and `virtual_packages`, falling back to `normalizer` for
/// version-constrained atoms and bare-name aliases. Returns the original
/// name, unresolved, if every step is exhausted — callers (the Dispatch
/// Finder via a plain map lookup) already treat an unresolved name as a
/// warning-and-false rather than an error.
pub fn resolve_name(
    pkgs: &HashMap<String, Package>,
    virtual_packages: &HashMap<String, String>,
    normalizer: &dyn NameNormalizer,
    name: &str,
) -> String {
    let mut current = name.to_string();

    for _ in 0..MAX_INDIRECTIONS {
        if pkgs.contains_key(&current) {
            return current;
        }

        if let Some(alias) = current.strip_prefix("virtual?") {
            match virtual_packages.get(alias) {
                Some(target) => {
                    current = target.clone();
                    continue;
                }
                None => break,
            }
        }

        if current.contains(['<', '>', '=']) {
            match normalizer.getpkgdepname(&current) {
                Ok(resolved) if !resolved.is_empty() => {
                    current = resolved;
                    continue;
                }
                _ => break,
            }
        }

        match normalizer.getpkgname(&current) {
            Ok(resolved) if !resolved.is_empty() && resolved != current => {
                current = resolved;
                continue;
            }
            _ => break,
        }
    }

    current
}
