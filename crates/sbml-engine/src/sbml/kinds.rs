//! Static accessor registry: one [`KindSpec`] per SBML element kind.
//!
//! Every getter, setter and creator the introspection surface exposes is
//! derived from these tables, so the set of names a kind answers to is fixed
//! per level and enabled package.

use crate::introspect::Plugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Str,
    Double,
    Int,
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub name: &'static str,
    pub ty: AttrType,
}

const fn text(name: &'static str) -> Attr {
    Attr { name, ty: AttrType::Str }
}

const fn real(name: &'static str) -> Attr {
    Attr { name, ty: AttrType::Double }
}

const fn int(name: &'static str) -> Attr {
    Attr { name, ty: AttrType::Int }
}

const fn flag(name: &'static str) -> Attr {
    Attr { name, ty: AttrType::Bool }
}

/// Where `getId` reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Id,
    Variable,
    Symbol,
}

impl IdSource {
    pub fn attribute(&self) -> &'static str {
        match self {
            IdSource::Id => "id",
            IdSource::Variable => "variable",
            IdSource::Symbol => "symbol",
        }
    }
}

/// A child slot of a kind. `container` names the `listOf*` wrapper, `None`
/// means the child sits directly under its parent.
#[derive(Debug, Clone, Copy)]
pub struct ChildSpec {
    pub container: Option<&'static str>,
    pub kind: Kind,
    pub creator: &'static str,
    pub getter: &'static str,
    pub min_level: u32,
}

const fn listed(container: &'static str, kind: Kind, name: &'static str) -> ChildSpec {
    ChildSpec {
        container: Some(container),
        kind,
        creator: name,
        getter: name,
        min_level: 1,
    }
}

const fn single(kind: Kind, name: &'static str) -> ChildSpec {
    ChildSpec {
        container: None,
        kind,
        creator: name,
        getter: name,
        min_level: 1,
    }
}

const fn since(spec: ChildSpec, level: u32) -> ChildSpec {
    ChildSpec { min_level: level, ..spec }
}

/// Attributes and children a package adds to a core kind.
#[derive(Debug, Clone, Copy)]
pub struct Extension {
    pub plugin: Plugin,
    pub attributes: &'static [Attr],
    pub children: &'static [ChildSpec],
}

#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    /// XML local name, also what `getElementName` reports.
    pub name: &'static str,
    /// Package owning the element, when it is not core.
    pub plugin: Option<Plugin>,
    pub attributes: &'static [Attr],
    pub id_source: IdSource,
    pub math: bool,
    pub message: bool,
    pub children: &'static [ChildSpec],
    pub extensions: &'static [Extension],
    pub requires_id: bool,
}

const BASE: KindSpec = KindSpec {
    name: "",
    plugin: None,
    attributes: &[],
    id_source: IdSource::Id,
    math: false,
    message: false,
    children: &[],
    extensions: &[],
    requires_id: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Model,
    ListOf,
    FunctionDefinition,
    UnitDefinition,
    Unit,
    Compartment,
    Species,
    Parameter,
    LocalParameter,
    InitialAssignment,
    AlgebraicRule,
    AssignmentRule,
    RateRule,
    Constraint,
    Reaction,
    SpeciesReference,
    ModifierSpeciesReference,
    KineticLaw,
    Event,
    Trigger,
    Delay,
    Priority,
    EventAssignment,
    GeneProduct,
    Objective,
    FluxObjective,
    GeneProductAssociation,
    FbcAnd,
    FbcOr,
    GeneProductRef,
    Group,
    Member,
}

static MODEL: KindSpec = KindSpec {
    name: "model",
    attributes: &[
        text("substanceUnits"),
        text("timeUnits"),
        text("volumeUnits"),
        text("areaUnits"),
        text("lengthUnits"),
        text("extentUnits"),
        text("conversionFactor"),
    ],
    children: &[
        listed("listOfFunctionDefinitions", Kind::FunctionDefinition, "FunctionDefinition"),
        listed("listOfUnitDefinitions", Kind::UnitDefinition, "UnitDefinition"),
        listed("listOfCompartments", Kind::Compartment, "Compartment"),
        listed("listOfSpecies", Kind::Species, "Species"),
        listed("listOfParameters", Kind::Parameter, "Parameter"),
        listed("listOfInitialAssignments", Kind::InitialAssignment, "InitialAssignment"),
        ChildSpec {
            container: Some("listOfRules"),
            kind: Kind::AlgebraicRule,
            creator: "AlgebraicRule",
            getter: "Rule",
            min_level: 1,
        },
        ChildSpec {
            container: Some("listOfRules"),
            kind: Kind::AssignmentRule,
            creator: "AssignmentRule",
            getter: "Rule",
            min_level: 1,
        },
        ChildSpec {
            container: Some("listOfRules"),
            kind: Kind::RateRule,
            creator: "RateRule",
            getter: "Rule",
            min_level: 1,
        },
        listed("listOfConstraints", Kind::Constraint, "Constraint"),
        listed("listOfReactions", Kind::Reaction, "Reaction"),
        listed("listOfEvents", Kind::Event, "Event"),
    ],
    extensions: &[
        Extension {
            plugin: Plugin::Fbc,
            attributes: &[flag("strict")],
            children: &[
                listed("listOfGeneProducts", Kind::GeneProduct, "GeneProduct"),
                listed("listOfObjectives", Kind::Objective, "Objective"),
            ],
        },
        Extension {
            plugin: Plugin::Groups,
            attributes: &[],
            children: &[listed("listOfGroups", Kind::Group, "Group")],
        },
    ],
    ..BASE
};

static LIST_OF: KindSpec = KindSpec {
    name: "listOf",
    ..BASE
};

static FUNCTION_DEFINITION: KindSpec = KindSpec {
    name: "functionDefinition",
    math: true,
    requires_id: true,
    ..BASE
};

static UNIT_DEFINITION: KindSpec = KindSpec {
    name: "unitDefinition",
    children: &[listed("listOfUnits", Kind::Unit, "Unit")],
    requires_id: true,
    ..BASE
};

static UNIT: KindSpec = KindSpec {
    name: "unit",
    attributes: &[text("kind"), real("exponent"), int("scale"), real("multiplier")],
    ..BASE
};

static COMPARTMENT: KindSpec = KindSpec {
    name: "compartment",
    attributes: &[
        real("spatialDimensions"),
        real("size"),
        text("units"),
        flag("constant"),
        text("outside"),
    ],
    requires_id: true,
    ..BASE
};

static SPECIES: KindSpec = KindSpec {
    name: "species",
    attributes: &[
        text("compartment"),
        real("initialAmount"),
        real("initialConcentration"),
        text("substanceUnits"),
        flag("hasOnlySubstanceUnits"),
        flag("boundaryCondition"),
        flag("constant"),
        text("conversionFactor"),
    ],
    extensions: &[Extension {
        plugin: Plugin::Fbc,
        attributes: &[int("charge"), text("chemicalFormula")],
        children: &[],
    }],
    requires_id: true,
    ..BASE
};

static PARAMETER: KindSpec = KindSpec {
    name: "parameter",
    attributes: &[real("value"), text("units"), flag("constant")],
    requires_id: true,
    ..BASE
};

static LOCAL_PARAMETER: KindSpec = KindSpec {
    name: "localParameter",
    attributes: &[real("value"), text("units")],
    ..BASE
};

static INITIAL_ASSIGNMENT: KindSpec = KindSpec {
    name: "initialAssignment",
    attributes: &[text("symbol")],
    id_source: IdSource::Symbol,
    math: true,
    ..BASE
};

static ALGEBRAIC_RULE: KindSpec = KindSpec {
    name: "algebraicRule",
    math: true,
    ..BASE
};

static ASSIGNMENT_RULE: KindSpec = KindSpec {
    name: "assignmentRule",
    attributes: &[text("variable")],
    id_source: IdSource::Variable,
    math: true,
    ..BASE
};

static RATE_RULE: KindSpec = KindSpec {
    name: "rateRule",
    attributes: &[text("variable")],
    id_source: IdSource::Variable,
    math: true,
    ..BASE
};

static CONSTRAINT: KindSpec = KindSpec {
    name: "constraint",
    math: true,
    message: true,
    ..BASE
};

static REACTION: KindSpec = KindSpec {
    name: "reaction",
    attributes: &[flag("reversible"), flag("fast"), text("compartment")],
    children: &[
        listed("listOfReactants", Kind::SpeciesReference, "Reactant"),
        listed("listOfProducts", Kind::SpeciesReference, "Product"),
        listed("listOfModifiers", Kind::ModifierSpeciesReference, "Modifier"),
        single(Kind::KineticLaw, "KineticLaw"),
    ],
    extensions: &[Extension {
        plugin: Plugin::Fbc,
        attributes: &[text("lowerFluxBound"), text("upperFluxBound")],
        children: &[single(Kind::GeneProductAssociation, "GeneProductAssociation")],
    }],
    requires_id: true,
    ..BASE
};

static SPECIES_REFERENCE: KindSpec = KindSpec {
    name: "speciesReference",
    attributes: &[text("species"), real("stoichiometry"), flag("constant")],
    ..BASE
};

static MODIFIER_SPECIES_REFERENCE: KindSpec = KindSpec {
    name: "modifierSpeciesReference",
    attributes: &[text("species")],
    ..BASE
};

static KINETIC_LAW: KindSpec = KindSpec {
    name: "kineticLaw",
    math: true,
    children: &[
        listed("listOfParameters", Kind::Parameter, "Parameter"),
        since(
            listed("listOfLocalParameters", Kind::LocalParameter, "LocalParameter"),
            3,
        ),
    ],
    ..BASE
};

static EVENT: KindSpec = KindSpec {
    name: "event",
    attributes: &[flag("useValuesFromTriggerTime")],
    children: &[
        single(Kind::Trigger, "Trigger"),
        since(single(Kind::Priority, "Priority"), 3),
        single(Kind::Delay, "Delay"),
        listed("listOfEventAssignments", Kind::EventAssignment, "EventAssignment"),
    ],
    ..BASE
};

static TRIGGER: KindSpec = KindSpec {
    name: "trigger",
    attributes: &[flag("initialValue"), flag("persistent")],
    math: true,
    ..BASE
};

static DELAY: KindSpec = KindSpec {
    name: "delay",
    math: true,
    ..BASE
};

static PRIORITY: KindSpec = KindSpec {
    name: "priority",
    math: true,
    ..BASE
};

static EVENT_ASSIGNMENT: KindSpec = KindSpec {
    name: "eventAssignment",
    attributes: &[text("variable")],
    id_source: IdSource::Variable,
    math: true,
    ..BASE
};

static GENE_PRODUCT: KindSpec = KindSpec {
    name: "geneProduct",
    plugin: Some(Plugin::Fbc),
    attributes: &[text("label"), text("associatedSpecies")],
    requires_id: true,
    ..BASE
};

static OBJECTIVE: KindSpec = KindSpec {
    name: "objective",
    plugin: Some(Plugin::Fbc),
    attributes: &[text("type")],
    children: &[listed("listOfFluxObjectives", Kind::FluxObjective, "FluxObjective")],
    ..BASE
};

static FLUX_OBJECTIVE: KindSpec = KindSpec {
    name: "fluxObjective",
    plugin: Some(Plugin::Fbc),
    attributes: &[text("reaction"), real("coefficient")],
    ..BASE
};

const ASSOCIATIONS: &[ChildSpec] = &[
    single(Kind::FbcAnd, "And"),
    single(Kind::FbcOr, "Or"),
    single(Kind::GeneProductRef, "GeneProductRef"),
];

static GENE_PRODUCT_ASSOCIATION: KindSpec = KindSpec {
    name: "geneProductAssociation",
    plugin: Some(Plugin::Fbc),
    children: ASSOCIATIONS,
    ..BASE
};

static FBC_AND: KindSpec = KindSpec {
    name: "and",
    plugin: Some(Plugin::Fbc),
    children: ASSOCIATIONS,
    ..BASE
};

static FBC_OR: KindSpec = KindSpec {
    name: "or",
    plugin: Some(Plugin::Fbc),
    children: ASSOCIATIONS,
    ..BASE
};

static GENE_PRODUCT_REF: KindSpec = KindSpec {
    name: "geneProductRef",
    plugin: Some(Plugin::Fbc),
    attributes: &[text("geneProduct")],
    ..BASE
};

static GROUP: KindSpec = KindSpec {
    name: "group",
    plugin: Some(Plugin::Groups),
    attributes: &[text("kind")],
    children: &[listed("listOfMembers", Kind::Member, "Member")],
    ..BASE
};

static MEMBER: KindSpec = KindSpec {
    name: "member",
    plugin: Some(Plugin::Groups),
    attributes: &[text("idRef"), text("metaIdRef")],
    ..BASE
};

impl Kind {
    pub fn spec(self) -> &'static KindSpec {
        match self {
            Kind::Model => &MODEL,
            Kind::ListOf => &LIST_OF,
            Kind::FunctionDefinition => &FUNCTION_DEFINITION,
            Kind::UnitDefinition => &UNIT_DEFINITION,
            Kind::Unit => &UNIT,
            Kind::Compartment => &COMPARTMENT,
            Kind::Species => &SPECIES,
            Kind::Parameter => &PARAMETER,
            Kind::LocalParameter => &LOCAL_PARAMETER,
            Kind::InitialAssignment => &INITIAL_ASSIGNMENT,
            Kind::AlgebraicRule => &ALGEBRAIC_RULE,
            Kind::AssignmentRule => &ASSIGNMENT_RULE,
            Kind::RateRule => &RATE_RULE,
            Kind::Constraint => &CONSTRAINT,
            Kind::Reaction => &REACTION,
            Kind::SpeciesReference => &SPECIES_REFERENCE,
            Kind::ModifierSpeciesReference => &MODIFIER_SPECIES_REFERENCE,
            Kind::KineticLaw => &KINETIC_LAW,
            Kind::Event => &EVENT,
            Kind::Trigger => &TRIGGER,
            Kind::Delay => &DELAY,
            Kind::Priority => &PRIORITY,
            Kind::EventAssignment => &EVENT_ASSIGNMENT,
            Kind::GeneProduct => &GENE_PRODUCT,
            Kind::Objective => &OBJECTIVE,
            Kind::FluxObjective => &FLUX_OBJECTIVE,
            Kind::GeneProductAssociation => &GENE_PRODUCT_ASSOCIATION,
            Kind::FbcAnd => &FBC_AND,
            Kind::FbcOr => &FBC_OR,
            Kind::GeneProductRef => &GENE_PRODUCT_REF,
            Kind::Group => &GROUP,
            Kind::Member => &MEMBER,
        }
    }
}

impl KindSpec {
    /// Attributes reachable through a view: core ones, or those of one package.
    pub fn view_attributes(&self, plugin: Option<Plugin>) -> &'static [Attr] {
        match plugin {
            None => self.attributes,
            Some(p) => self.extension(p).map(|e| e.attributes).unwrap_or(&[]),
        }
    }

    pub fn view_children(&self, plugin: Option<Plugin>) -> &'static [ChildSpec] {
        match plugin {
            None => self.children,
            Some(p) => self.extension(p).map(|e| e.children).unwrap_or(&[]),
        }
    }

    pub fn extension(&self, plugin: Plugin) -> Option<&'static Extension> {
        self.extensions.iter().find(|e| e.plugin == plugin)
    }

    /// Every child slot, core first then packages, paired with its owning package.
    pub fn all_children(&self) -> impl Iterator<Item = (Option<Plugin>, &'static ChildSpec)> {
        self.children
            .iter()
            .map(|c| (None, c))
            .chain(
                self.extensions
                    .iter()
                    .flat_map(|e| e.children.iter().map(move |c| (Some(e.plugin), c))),
            )
    }
}

/// Upper-case the first character: `initialAmount` -> `InitialAmount`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
