#![forbid(unsafe_code)]

//! Conversion between [`AggregateContainer`] and its nested on-channel form.
//!
//! On the channel an aggregate is a single frame whose payload is a chain of
//! layers. Each entry contributes a marker layer (its subframe header) with
//! the entry's payload nested directly underneath; the next entry's marker is
//! nested under that payload. The last entry is outermost.

use bytes::Bytes;

use crate::errors::{MacError, MacResult};
use crate::frame::{DataHeader, DataUnit, UnitKind};
use crate::msdu::AggregateContainer;

/// One layer of the nested chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// Subframe header of one entry. `byte_len` is the entry length on the
    /// wire, payload and padding included.
    Marker { header: DataHeader, mesh: bool, byte_len: u64, inner: Option<Box<Layer>> },
    /// Opaque payload.
    Payload { data: Bytes, inner: Option<Box<Layer>> },
}

impl Layer {
    fn split(self) -> (Layer, Option<Box<Layer>>) {
        match self {
            Layer::Marker { header, mesh, byte_len, inner } => {
                (Layer::Marker { header, mesh, byte_len, inner: None }, inner)
            }
            Layer::Payload { data, inner } => (Layer::Payload { data, inner: None }, inner),
        }
    }

    fn with_inner(self, next: Option<Box<Layer>>) -> Layer {
        match self {
            Layer::Marker { header, mesh, byte_len, .. } => {
                Layer::Marker { header, mesh, byte_len, inner: next }
            }
            Layer::Payload { data, .. } => Layer::Payload { data, inner: next },
        }
    }
}

/// An aggregate as carried on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub header: DataHeader,
    pub mesh: bool,
    /// Sum of entry lengths.
    pub byte_len: u64,
    pub chain: Option<Box<Layer>>,
}

impl WireFrame {
    /// Number of layers in the chain.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.chain.as_deref();
        while let Some(layer) = cursor {
            depth += 1;
            cursor = match layer {
                Layer::Marker { inner, .. } | Layer::Payload { inner, .. } => inner.as_deref(),
            };
        }
        depth
    }
}

/// Fold a container into its nested form. The container is consumed entry by entry.
pub fn encode(mut container: AggregateContainer) -> MacResult<WireFrame> {
    let header = container.header().clone();
    let mesh = container.is_mesh();
    let byte_len = container.byte_len();

    // popped back to front, so the first element is the last entry
    let mut popped = Vec::with_capacity(container.count());
    while let Some(mut subframe) = container.pop_back_subframe()? {
        let marker_len = subframe.byte_len();
        let payload = subframe.decapsulate();
        let is_mesh = subframe.kind() == UnitKind::MeshSubframe;
        popped.push((subframe.header().clone(), is_mesh, marker_len, payload));
    }

    let mut chain: Option<Box<Layer>> = None;
    for (entry_header, entry_mesh, marker_len, payload) in popped.into_iter().rev() {
        let below = match payload {
            Some(data) => Some(Box::new(Layer::Payload { data, inner: chain })),
            None => chain,
        };
        chain = Some(Box::new(Layer::Marker {
            header: entry_header,
            mesh: entry_mesh,
            byte_len: marker_len,
            inner: below,
        }));
    }

    Ok(WireFrame { header, mesh, byte_len, chain })
}

/// Unfold a received aggregate into a container.
pub fn decode(frame: WireFrame) -> MacResult<AggregateContainer> {
    let mut layers = Vec::new();
    let mut next = frame.chain;
    while let Some(layer) = next {
        let (this, inner) = layer.split();
        layers.push(this);
        next = inner;
    }

    // Markers in unwrap order, each with its payload re-attached.
    let mut markers: Vec<DataUnit> = Vec::new();
    for layer in layers {
        match layer {
            Layer::Marker { header, mesh, byte_len, .. } => {
                let kind = if mesh { UnitKind::MeshSubframe } else { UnitKind::PlainWithHeader };
                let mut unit = DataUnit::bare(kind, header);
                unit.set_byte_len(byte_len);
                markers.push(unit);
            }
            Layer::Payload { data, .. } => match markers.last_mut() {
                Some(owner) if owner.payload().is_none() => owner.attach_payload(data),
                Some(_) => {
                    return Err(MacError::Malformed("two payloads under one subframe header".into()))
                }
                None => {
                    return Err(MacError::Malformed(
                        "payload ahead of the first subframe header".into(),
                    ))
                }
            },
        }
    }

    let mut container = AggregateContainer::new(frame.header);
    for unit in markers.into_iter().rev() {
        container.push_back(unit)?;
    }
    if container.byte_len() != frame.byte_len {
        return Err(MacError::Malformed(format!(
            "aggregate announces {} octets but entries sum to {}",
            frame.byte_len,
            container.byte_len()
        )));
    }
    Ok(container)
}

/// Deliverable units of a received aggregate, front to back.
pub fn expand(mut container: AggregateContainer) -> MacResult<Vec<DataUnit>> {
    let mut out = Vec::with_capacity(container.count());
    while let Some(unit) = container.pop_front()? {
        out.push(unit);
    }
    Ok(out)
}

/// Re-nest a chain below a new outermost layer. Used to build frames by hand in tests and fuzzing.
pub fn push_layer(chain: Option<Box<Layer>>, outer: Layer) -> Option<Box<Layer>> {
    Some(Box::new(outer.with_inner(chain)))
}
