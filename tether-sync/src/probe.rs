//! Batch-scoped hosting probe.
//!
//! Hosted placements find their host by dropping a tiny marker element at the
//! target point and asking the document what it intersects. The marker and its
//! family are loaded on first use, reused for the rest of the batch, and
//! removed when the scope ends.

use tether_core::{FamilyRef, Point3};
use tether_host::{
    ElementId, HostDocument, HostError, HostingBehavior, NativeCreate, StructuralUse,
};

use crate::error::SyncError;

pub struct ProbeScope {
    offset: f64,
    family: Option<FamilyRef>,
    instance: Option<ElementId>,
}

impl ProbeScope {
    fn new(offset: f64) -> Self {
        Self {
            offset,
            family: None,
            instance: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.family.is_some()
    }

    /// First element of the behavior's host class met by the probe at `point`.
    pub fn find_host<D: HostDocument + ?Sized>(
        &mut self,
        doc: &mut D,
        point: Point3,
        behavior: HostingBehavior,
    ) -> Result<Option<ElementId>, HostError> {
        let Some(class) = behavior.host_class() else {
            return Ok(None);
        };
        let target = point.offset_z(behavior.probe_direction() * self.offset);
        let probe = match self.instance {
            Some(id) => {
                doc.move_to(id, target)?;
                id
            }
            None => self.place(doc, target)?,
        };
        let host = doc.intersecting(probe, class)?.into_iter().next();
        tracing::debug!(?point, ?host, "probe");
        Ok(host)
    }

    fn place<D: HostDocument + ?Sized>(
        &mut self,
        doc: &mut D,
        at: Point3,
    ) -> Result<ElementId, HostError> {
        let family = match &self.family {
            Some(family) => family.clone(),
            None => {
                let family = doc.load_probe_family()?;
                self.family = Some(family.clone());
                family
            }
        };
        let type_name = doc
            .family_types(&family.family_name)?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::UnknownType {
                family: family.family_name.clone(),
                type_name: String::new(),
            })?;
        let id = doc.create(NativeCreate::Instance {
            family,
            type_name,
            origin: at,
            level: None,
            host: None,
            reference_direction: None,
            structural: StructuralUse::NonStructural,
        })?;
        self.instance = Some(id);
        Ok(id)
    }

    fn release<D: HostDocument + ?Sized>(&mut self, doc: &mut D) -> Result<(), HostError> {
        if let Some(id) = self.instance.take() {
            if doc.contains(id) {
                doc.delete(id)?;
            }
        }
        if let Some(family) = self.family.take() {
            doc.unload_family(&family.family_name)?;
        }
        Ok(())
    }
}

/// Run `body` with a probe scope, then remove the probe whatever `body`
/// returned.
pub fn with_probe<D, T, F>(doc: &mut D, offset: f64, body: F) -> Result<T, SyncError>
where
    D: HostDocument + ?Sized,
    F: FnOnce(&mut D, &mut ProbeScope) -> Result<T, SyncError>,
{
    let mut scope = ProbeScope::new(offset);
    let result = body(doc, &mut scope);
    let released = scope.release(doc);
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), released) => {
            if let Err(cleanup) = released {
                tracing::warn!(error = %cleanup, "probe cleanup failed after error");
            }
            Err(err)
        }
    }
}
