//! Dtype families, concrete dtypes and the registry that maps names to them.
//!
//! A [`MetaDtype`] is a family of interpretations such as `uint` or `float`. Binding
//! it to a bit length gives a [`Dtype`] (`uint12`, `float16`) whose `get` and `set`
//! are the family's decode and encode functions closed over that length. The
//! [`Register`] maps family names and aliases to families and checks every binding it
//! hands out by decoding a zero-filled pattern of the bound length.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use tracing::{debug, trace};

use crate::{
    codecs,
    errors::{Error, InterpretError, Result},
    options::Options,
    store::BitStore,
    value::Value,
};

/// Encodes a value into bits. The length is the bound length, if any.
pub type EncodeFn = Arc<dyn Fn(&Value, Option<usize>) -> Result<BitStore> + Send + Sync>;

/// Decodes a value starting at a bit offset, returning it with the offset just past it.
/// A `None` length means "the rest of the data" for families that need one.
pub type DecodeFn =
    Arc<dyn Fn(&BitStore, usize, Option<usize>) -> Result<(Value, usize), InterpretError> + Send + Sync>;

/// How a family's bit length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthKind {
    /// One canonical length (`bool`, `bfloat`, the micro-floats).
    Fixed(usize),
    /// The encoding determines its own length (`ue`, `se`); none may be supplied.
    SelfDelimiting,
    /// The caller supplies the length every time (`uint`, `hex`).
    Variable,
}

/// Classification flags of a family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DtypeTraits {
    pub is_integer: bool,
    pub is_float: bool,
    pub is_signed: bool,
    /// The length can't be known before decoding and must not be supplied.
    pub is_unknown_length: bool,
}

/// A named family of interpretations sharing one encode/decode pair.
#[derive(Clone)]
pub struct MetaDtype {
    name: String,
    traits: DtypeTraits,
    length: LengthKind,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl MetaDtype {
    /// Creates a family. A `Some` length makes it fixed-length.
    ///
    /// Fails when a length is given for an unknown-length family, or when the family
    /// claims to be both float and integer.
    pub fn new(
        name: impl Into<String>,
        traits: DtypeTraits,
        length: Option<usize>,
        encode: EncodeFn,
        decode: DecodeFn,
    ) -> Result<Self> {
        let name = name.into();
        if traits.is_unknown_length && length.is_some() {
            return Err(Error::InvalidMetaDtype {
                name,
                reason: "an unknown-length family can't have a fixed length",
            });
        }
        if traits.is_float && traits.is_integer {
            return Err(Error::InvalidMetaDtype {
                name,
                reason: "a family can't be both float and integer",
            });
        }
        let length = match length {
            Some(n) => LengthKind::Fixed(n),
            None if traits.is_unknown_length => LengthKind::SelfDelimiting,
            None => LengthKind::Variable,
        };
        Ok(Self {
            name,
            traits,
            length,
            encode,
            decode,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn traits(&self) -> DtypeTraits {
        self.traits
    }

    pub fn length_kind(&self) -> LengthKind {
        self.length
    }

    pub fn is_fixed_length(&self) -> bool {
        matches!(self.length, LengthKind::Fixed(_))
    }

    pub fn is_unknown_length(&self) -> bool {
        self.traits.is_unknown_length
    }

    /// Binds the family to a length.
    ///
    /// `None` and `Some(0)` leave the length unset: fixed families then use their
    /// canonical length and self-delimiting ones stay unbound. Variable families need
    /// an explicit length; zero is accepted and skips validation.
    pub fn get_dtype(self: &Arc<Self>, length: Option<usize>) -> Result<Dtype> {
        let bound = match (self.length, length) {
            (LengthKind::Fixed(n), None | Some(0)) => Some(n),
            (LengthKind::Fixed(n), Some(m)) if m == n => Some(n),
            (LengthKind::Fixed(_), Some(_)) => {
                return Err(self.length_error(length, "the family has a different fixed length"));
            }
            (LengthKind::SelfDelimiting, None | Some(0)) => None,
            (LengthKind::SelfDelimiting, Some(_)) => {
                return Err(self.length_error(length, "a self-delimiting family takes no length"));
            }
            (LengthKind::Variable, None) => {
                return Err(self.length_error(length, "the family needs an explicit length"));
            }
            (LengthKind::Variable, Some(n)) => Some(n),
        };
        Ok(Dtype {
            meta: Arc::clone(self),
            length: bound,
        })
    }

    /// Encodes with the family's function directly, without binding a length.
    pub fn encode(&self, value: &Value, length: Option<usize>) -> Result<BitStore> {
        (self.encode)(value, length)
    }

    /// Decodes with the family's function directly.
    pub fn decode(
        &self,
        store: &BitStore,
        start: usize,
        length: Option<usize>,
    ) -> Result<(Value, usize), InterpretError> {
        (self.decode)(store, start, length)
    }

    fn length_error(&self, length: Option<usize>, reason: &'static str) -> Error {
        Error::InvalidDtypeLength {
            name: self.name.clone(),
            length,
            reason,
        }
    }
}

impl fmt::Debug for MetaDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDtype")
            .field("name", &self.name)
            .field("traits", &self.traits)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// A family bound to one concrete length.
///
/// Compares and hashes by its printable name.
#[derive(Clone)]
pub struct Dtype {
    meta: Arc<MetaDtype>,
    length: Option<usize>,
}

impl Dtype {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The bound length; `None` for self-delimiting families.
    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn meta(&self) -> &MetaDtype {
        &self.meta
    }

    pub fn is_integer(&self) -> bool {
        self.meta.traits.is_integer
    }

    pub fn is_float(&self) -> bool {
        self.meta.traits.is_float
    }

    pub fn is_signed(&self) -> bool {
        self.meta.traits.is_signed
    }

    pub fn is_fixed_length(&self) -> bool {
        self.meta.is_fixed_length()
    }

    pub fn is_unknown_length(&self) -> bool {
        self.meta.is_unknown_length()
    }

    /// Decodes the value starting at `start`.
    pub fn get(&self, store: &BitStore, start: usize) -> Result<Value> {
        Ok(self.read(store, start)?.0)
    }

    /// Decodes the value starting at `start` and returns the offset just past it.
    pub fn read(&self, store: &BitStore, start: usize) -> Result<(Value, usize), InterpretError> {
        (self.meta.decode)(store, start, self.length)
    }

    /// Encodes `value`. Fails if the result doesn't have the bound length.
    pub fn set(&self, value: &Value) -> Result<BitStore> {
        let store = (self.meta.encode)(value, self.length)?;
        match self.length {
            Some(n) if n != 0 && store.len() != n => Err(Error::creation(format!(
                "{self} needs {n} bits but the value encodes to {}",
                store.len()
            ))),
            _ => Ok(store),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(n) if n != 0 && !self.is_fixed_length() => write!(f, "{}{n}", self.meta.name),
            _ => f.write_str(&self.meta.name),
        }
    }
}

impl fmt::Debug for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dtype('{self}')")
    }
}

impl PartialEq for Dtype {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Dtype {}

impl Hash for Dtype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

static GLOBAL: OnceLock<Register> = OnceLock::new();

/// Maps family names and aliases to [`MetaDtype`]s.
///
/// Build one fully, then either pass it explicitly to the `*_in` functions or
/// [`install`](Register::install) it as the process-wide registry. Adding families to
/// a registry that other threads are reading is not supported.
#[derive(Debug, Clone, Default)]
pub struct Register {
    name_to_meta_dtype: HashMap<String, Arc<MetaDtype>>,
}

impl Register {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in family.
    pub fn with_builtins(options: &Options) -> Result<Self> {
        let mut register = Self::new();
        for meta in codecs::builtin_meta_dtypes(options)? {
            register.add_meta_dtype(meta);
        }
        for (name, alias) in codecs::BUILTIN_ALIASES {
            register.add_meta_dtype_alias(name, alias)?;
        }
        debug!(
            families = register.name_to_meta_dtype.len(),
            mxfp_overflow = %options.mxfp_overflow,
            "populated dtype registry"
        );
        Ok(register)
    }

    /// Installs `register` as the process-wide registry.
    ///
    /// Must happen before the first call to [`Register::global`]; otherwise the
    /// registry is handed back.
    pub fn install(register: Register) -> Result<(), Register> {
        GLOBAL.set(register)?;
        debug!("installed process-wide dtype registry");
        Ok(())
    }

    /// The process-wide registry, initialized with the built-ins if none was installed.
    ///
    /// # Panics
    ///
    /// If the built-in family table fails its own consistency checks.
    pub fn global() -> &'static Register {
        GLOBAL.get_or_init(|| {
            Register::with_builtins(&Options::default()).expect("built-in dtype families must be consistent")
        })
    }

    /// Adds a family under its own name, replacing any previous one.
    pub fn add_meta_dtype(&mut self, meta_dtype: MetaDtype) {
        trace!(name = meta_dtype.name(), "adding meta dtype");
        self.name_to_meta_dtype
            .insert(meta_dtype.name.clone(), Arc::new(meta_dtype));
    }

    /// Makes `alias` another name for the family registered as `name`.
    pub fn add_meta_dtype_alias(&mut self, name: &str, alias: &str) -> Result<()> {
        let meta = self.meta_dtype(name)?;
        trace!(name, alias, "adding meta dtype alias");
        self.name_to_meta_dtype.insert(alias.to_string(), meta);
        Ok(())
    }

    /// Looks up a family by name or alias.
    pub fn meta_dtype(&self, name: &str) -> Result<Arc<MetaDtype>> {
        self.name_to_meta_dtype
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDtype(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_meta_dtype.contains_key(name)
    }

    /// Registered names, aliases included, in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.name_to_meta_dtype.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolves `name` bound to `length` and checks that the binding can decode.
    pub fn get_dtype(&self, name: &str, length: Option<usize>) -> Result<Dtype> {
        let dtype = self.meta_dtype(name)?.get_dtype(length)?;
        if let Some(n) = dtype.length.filter(|n| *n != 0) {
            let zeros = BitStore::zeros(n);
            if let Err(source) = dtype.read(&zeros, 0) {
                debug!(name, length = n, %source, "dtype rejected by self-check");
                return Err(Error::InvalidDtype {
                    name: dtype.to_string(),
                    source,
                });
            }
        }
        Ok(dtype)
    }

    /// Resolves a compact key such as `"uint12"`, `"float"` or `"p4binary8"`.
    pub fn dtype_from_key(&self, key: &str) -> Result<Dtype> {
        let (name, length) = split_key(key);
        if length.is_some() && !self.contains(name) && self.contains(key) {
            // The trailing digits belong to the name (a family like "e4m3mxfp" ends
            // in letters, but user families may not).
            return self.get_dtype(key, None);
        }
        self.get_dtype(name, length)
    }
}

/// Splits a trailing run of digits (and an optional ':' before it) off a key.
pub(crate) fn split_key(key: &str) -> (&str, Option<usize>) {
    let name_end = key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, digits) = key.split_at(name_end);
    let name = name.strip_suffix(':').unwrap_or(name);
    (name, digits.parse().ok())
}
