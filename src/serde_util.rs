//! Maps of complex arrays as paired `{"real": [...], "imag": [...]}` documents.
use std::hash::Hash;

use indexmap::IndexMap;
use ndarray::Array1;
use num::complex::Complex64;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Serialize, Deserialize)]
struct ComplexArray {
    real: Vec<f64>,
    imag: Vec<f64>,
}

impl From<&Array1<Complex64>> for ComplexArray {
    fn from(array: &Array1<Complex64>) -> Self {
        Self {
            real: array.iter().map(|c| c.re).collect(),
            imag: array.iter().map(|c| c.im).collect(),
        }
    }
}

impl ComplexArray {
    fn into_array<E: de::Error>(self) -> Result<Array1<Complex64>, E> {
        if self.real.len() != self.imag.len() {
            return Err(E::custom(format!(
                "real and imag lengths differ: {} != {}",
                self.real.len(),
                self.imag.len()
            )));
        }
        Ok(self
            .real
            .into_iter()
            .zip(self.imag)
            .map(|(re, im)| Complex64::new(re, im))
            .collect())
    }
}

/// Use with `#[serde(with = "serde_util::complex_array_map")]` on maps from
/// names to complex arrays.
pub mod complex_array_map {
    use super::{
        Array1, ComplexArray, Complex64, Deserialize, Deserializer, Hash, IndexMap, Serialize,
        Serializer,
    };

    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<K, S>(
        map: &IndexMap<K, Array1<Complex64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        K: Serialize + Hash + Eq,
        S: Serializer,
    {
        let map: IndexMap<&K, ComplexArray> = map.iter().map(|(k, v)| (k, v.into())).collect();
        map.serialize(serializer)
    }

    /// # Errors
    ///
    /// Fails if the real and imaginary parts of an entry differ in length.
    pub fn deserialize<'de, K, D>(
        deserializer: D,
    ) -> Result<IndexMap<K, Array1<Complex64>>, D::Error>
    where
        K: Deserialize<'de> + Hash + Eq,
        D: Deserializer<'de>,
    {
        IndexMap::<K, ComplexArray>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| Ok((k, v.into_array::<D::Error>()?)))
            .collect()
    }
}
