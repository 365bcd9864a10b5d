//! Target table definitions.
//!
//! Every destination table is described once here: which flat columns feed
//! it and under which names, its primary key, and the tables it references.
//! The loader consumes [`CATALOG`] generically; nothing else in the crate
//! knows about individual tables.

use std::collections::{BTreeSet, HashMap};

/// Role of a table in the schema.
///
/// Variants are ordered the way tables load when foreign keys leave a
/// choice: lookups, then shared lookups, then principals, then facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    /// Code → label lookup table.
    Dimension,
    /// Lookup table fed from both the patient and establishment sides.
    SharedDimension,
    /// Core business table with its own identity.
    Principal,
    /// Event table (one row per dose application).
    Fact,
}

/// One source → target rename map.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    /// Label for diagnostics ("patient", "establishment", ...).
    pub side: &'static str,
    /// `(source column, target column)` pairs, in target column order.
    pub columns: &'static [(&'static str, &'static str)],
}

impl Projection {
    pub const fn new(side: &'static str, columns: &'static [(&'static str, &'static str)]) -> Self {
        Self { side, columns }
    }

    pub fn source_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(source, _)| *source)
    }

    pub fn target_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(_, target)| *target)
    }
}

/// Column referencing another table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
}

impl ForeignKey {
    pub const fn new(column: &'static str, references: &'static str) -> Self {
        Self { column, references }
    }
}

/// Definition of one destination table.
#[derive(Debug, Clone, Copy)]
pub struct EntityDef {
    pub table: &'static str,
    pub kind: EntityKind,
    /// Row sources. Shared dimensions have one per side, all with the same
    /// target columns; every other entity has exactly one.
    pub projections: &'static [Projection],
    /// Target columns forming the primary key.
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

impl EntityDef {
    /// Target column names, in insert order.
    pub fn target_columns(&self) -> Vec<&'static str> {
        self.projections
            .first()
            .map(|p| p.target_columns().collect())
            .unwrap_or_default()
    }

    /// Distinct tables this entity references.
    pub fn depends_on(&self) -> BTreeSet<&'static str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references)
            .filter(|table| *table != self.table)
            .collect()
    }
}

/// Problems with a set of entity definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Table {table} is defined more than once")]
    DuplicateTable { table: &'static str },

    #[error("Table {table} has no projection")]
    NoProjection { table: &'static str },

    #[error("Table {table} has no primary key")]
    NoPrimaryKey { table: &'static str },

    #[error("Table {table}: projection '{side}' does not match the target columns of the first projection")]
    ProjectionMismatch {
        table: &'static str,
        side: &'static str,
    },

    #[error("Table {table}: key or foreign-key column {column} is not a target column")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("Table {table} references undefined table {references}")]
    UnknownReference {
        table: &'static str,
        references: &'static str,
    },

    #[error("Dependency cycle among tables: {tables:?}")]
    Cycle { tables: Vec<&'static str> },
}

/// Check each definition and return them in load order.
///
/// Referenced tables come before the tables referencing them. Among tables
/// ready to load, the lowest [`EntityKind`] goes first, then declaration
/// order.
pub fn load_order(entities: &[EntityDef]) -> Result<Vec<&EntityDef>, CatalogError> {
    let mut by_table: HashMap<&str, usize> = HashMap::new();
    for (i, entity) in entities.iter().enumerate() {
        if by_table.insert(entity.table, i).is_some() {
            return Err(CatalogError::DuplicateTable {
                table: entity.table,
            });
        }
    }

    for entity in entities {
        validate(entity)?;
        for fk in entity.foreign_keys {
            if !by_table.contains_key(fk.references) {
                return Err(CatalogError::UnknownReference {
                    table: entity.table,
                    references: fk.references,
                });
            }
        }
    }

    let mut placed = vec![false; entities.len()];
    let mut order = Vec::with_capacity(entities.len());

    while order.len() < entities.len() {
        let next = entities
            .iter()
            .enumerate()
            .filter(|(i, entity)| {
                !placed[*i]
                    && entity
                        .depends_on()
                        .iter()
                        .all(|dep| placed[by_table[dep]])
            })
            .min_by_key(|(i, entity)| (entity.kind, *i))
            .map(|(i, _)| i);

        match next {
            Some(i) => {
                placed[i] = true;
                order.push(&entities[i]);
            }
            None => {
                let tables = entities
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed[*i])
                    .map(|(_, e)| e.table)
                    .collect();
                return Err(CatalogError::Cycle { tables });
            }
        }
    }

    Ok(order)
}

fn validate(entity: &EntityDef) -> Result<(), CatalogError> {
    let Some(first) = entity.projections.first() else {
        return Err(CatalogError::NoProjection {
            table: entity.table,
        });
    };

    if entity.primary_key.is_empty() {
        return Err(CatalogError::NoPrimaryKey {
            table: entity.table,
        });
    }

    let targets: Vec<&str> = first.target_columns().collect();
    for projection in &entity.projections[1..] {
        if !projection.target_columns().eq(targets.iter().copied()) {
            return Err(CatalogError::ProjectionMismatch {
                table: entity.table,
                side: projection.side,
            });
        }
    }

    let key_columns = entity.primary_key.iter().copied();
    let fk_columns = entity.foreign_keys.iter().map(|fk| fk.column);
    for column in key_columns.chain(fk_columns) {
        if !targets.contains(&column) {
            return Err(CatalogError::UnknownColumn {
                table: entity.table,
                column,
            });
        }
    }

    Ok(())
}

/// Look up a definition by table name.
pub fn get(table: &str) -> Option<&'static EntityDef> {
    CATALOG.iter().find(|e| e.table == table)
}

/// Table names in declaration order.
pub fn table_names() -> Vec<&'static str> {
    CATALOG.iter().map(|e| e.table).collect()
}

/// Code → label lookup table fed by one code/label column pair.
macro_rules! dimension {
    ($table:literal, $side:literal, $code:literal, $label:literal) => {
        EntityDef {
            table: $table,
            kind: EntityKind::Dimension,
            projections: &[Projection::new(
                $side,
                &[($code, "codigo"), ($label, "descricao")],
            )],
            primary_key: &["codigo"],
            foreign_keys: &[],
        }
    };
}

// =============================================================================
// Dimensions (no foreign keys)
// =============================================================================

pub const RACA_COR: EntityDef = dimension!(
    "RacaCor",
    "patient",
    "codigo_raca_cor_paciente",
    "nome_raca_cor_paciente"
);

pub const ETNIA_INDIGENA: EntityDef = dimension!(
    "EtniaIndigena",
    "patient",
    "codigo_etnia_indigena_paciente",
    "nome_etnia_indigena_paciente"
);

pub const FABRICANTE: EntityDef = dimension!(
    "Fabricante",
    "vaccine",
    "codigo_vacina_fabricante",
    "descricao_vacina_fabricante"
);

pub const DOSE_VACINA: EntityDef = dimension!(
    "DoseVacina",
    "application",
    "codigo_dose_vacina",
    "descricao_dose_vacina"
);

pub const GRUPO_ATENDIMENTO: EntityDef = dimension!(
    "GrupoAtendimento",
    "vaccine",
    "codigo_vacina_grupo_atendimento",
    "descricao_vacina_grupo_atendimento"
);

pub const CATEGORIA_ATENDIMENTO: EntityDef = dimension!(
    "CategoriaAtendimento",
    "vaccine",
    "codigo_vacina_categoria_atendimento",
    "descricao_vacina_categoria_atendimento"
);

pub const TIPO_ESTABELECIMENTO: EntityDef = dimension!(
    "TipoEstabelecimento",
    "establishment",
    "codigo_tipo_estabelecimento",
    "descricao_tipo_estabelecimento"
);

pub const NATUREZA_ESTABELECIMENTO: EntityDef = dimension!(
    "NaturezaEstabelecimento",
    "establishment",
    "codigo_natureza_estabelecimento",
    "descricao_natureza_estabelecimento"
);

pub const LOCAL_APLICACAO: EntityDef = dimension!(
    "LocalAplicacao",
    "application",
    "codigo_local_aplicacao",
    "descricao_local_aplicacao"
);

pub const VIA_ADMINISTRACAO: EntityDef = dimension!(
    "ViaAdministracao",
    "application",
    "codigo_via_administracao",
    "descricao_via_administracao"
);

pub const ESTRATEGIA_VACINACAO: EntityDef = dimension!(
    "EstrategiaVacinacao",
    "application",
    "codigo_estrategia_vacinacao",
    "descricao_estrategia_vacinacao"
);

pub const CONDICAO_MATERNAL: EntityDef = dimension!(
    "CondicaoMaternal",
    "application",
    "codigo_condicao_maternal",
    "descricao_condicao_maternal"
);

pub const ORIGEM_REGISTRO: EntityDef = dimension!(
    "OrigemRegistro",
    "application",
    "codigo_origem_registro",
    "descricao_origem_registro"
);

pub const SISTEMA_ORIGEM: EntityDef = dimension!(
    "SistemaOrigem",
    "application",
    "codigo_sistema_origem",
    "descricao_sistema_origem"
);

// =============================================================================
// Shared dimensions (patient residence and establishment location)
// =============================================================================

pub const UF: EntityDef = EntityDef {
    table: "UF",
    kind: EntityKind::SharedDimension,
    projections: &[
        Projection::new(
            "patient",
            &[("sigla_uf_paciente", "sigla"), ("nome_uf_paciente", "nome")],
        ),
        Projection::new(
            "establishment",
            &[
                ("sigla_uf_estabelecimento", "sigla"),
                ("nome_uf_estabelecimento", "nome"),
            ],
        ),
    ],
    primary_key: &["sigla"],
    foreign_keys: &[],
};

pub const MUNICIPIO: EntityDef = EntityDef {
    table: "Municipio",
    kind: EntityKind::SharedDimension,
    projections: &[
        Projection::new(
            "patient",
            &[
                ("codigo_municipio_paciente", "codigo"),
                ("nome_municipio_paciente", "nome"),
                ("sigla_uf_paciente", "uf_sigla"),
            ],
        ),
        Projection::new(
            "establishment",
            &[
                ("codigo_municipio_estabelecimento", "codigo"),
                ("nome_municipio_estabelecimento", "nome"),
                ("sigla_uf_estabelecimento", "uf_sigla"),
            ],
        ),
    ],
    primary_key: &["codigo"],
    foreign_keys: &[ForeignKey::new("uf_sigla", "UF")],
};

// =============================================================================
// Principal entities
// =============================================================================

pub const PACIENTE: EntityDef = EntityDef {
    table: "Paciente",
    kind: EntityKind::Principal,
    projections: &[Projection::new(
        "patient",
        &[
            ("codigo_paciente", "id"),
            ("tipo_sexo_paciente", "sexo"),
            ("numero_idade_paciente", "idade"),
            ("numero_cep_paciente", "cep"),
            ("descricao_nacionalidade_paciente", "nacionalidade"),
            ("codigo_raca_cor_paciente", "raca_cor_fk"),
            ("codigo_municipio_paciente", "municipio_fk"),
            ("codigo_etnia_indigena_paciente", "etnia_indigena_fk"),
        ],
    )],
    primary_key: &["id"],
    foreign_keys: &[
        ForeignKey::new("raca_cor_fk", "RacaCor"),
        ForeignKey::new("municipio_fk", "Municipio"),
        ForeignKey::new("etnia_indigena_fk", "EtniaIndigena"),
    ],
};

pub const ESTABELECIMENTO: EntityDef = EntityDef {
    table: "Estabelecimento",
    kind: EntityKind::Principal,
    projections: &[Projection::new(
        "establishment",
        &[
            ("codigo_cnes_estabelecimento", "id"),
            ("nome_razao_social_estabelecimento", "razao_social"),
            // Misspelled in the registry itself.
            ("nome_fantasia_estalecimento", "nome_fantasia"),
            ("codigo_municipio_estabelecimento", "municipio_fk"),
            ("codigo_tipo_estabelecimento", "tipo_fk"),
            ("codigo_natureza_estabelecimento", "natureza_fk"),
        ],
    )],
    primary_key: &["id"],
    foreign_keys: &[
        ForeignKey::new("municipio_fk", "Municipio"),
        ForeignKey::new("tipo_fk", "TipoEstabelecimento"),
        ForeignKey::new("natureza_fk", "NaturezaEstabelecimento"),
    ],
};

pub const VACINA: EntityDef = EntityDef {
    table: "Vacina",
    kind: EntityKind::Principal,
    projections: &[Projection::new(
        "vaccine",
        &[
            ("codigo_vacina", "id"),
            ("descricao_vacina", "descricao"),
            ("sigla_vacina", "sigla"),
            ("codigo_vacina_fabricante", "fabricante_fk"),
            ("codigo_vacina_grupo_atendimento", "grupo_atendimento_fk"),
            ("codigo_vacina_categoria_atendimento", "categoria_atendimento_fk"),
        ],
    )],
    primary_key: &["id"],
    foreign_keys: &[
        ForeignKey::new("fabricante_fk", "Fabricante"),
        ForeignKey::new("grupo_atendimento_fk", "GrupoAtendimento"),
        ForeignKey::new("categoria_atendimento_fk", "CategoriaAtendimento"),
    ],
};

// =============================================================================
// Fact table
// =============================================================================

pub const APLICACAO: EntityDef = EntityDef {
    table: "Aplicacao",
    kind: EntityKind::Fact,
    projections: &[Projection::new(
        "application",
        &[
            ("codigo_documento", "id"),
            ("data_vacina", "data_aplicacao"),
            ("codigo_lote_vacina", "lote"),
            ("status_documento", "status_documento"),
            ("codigo_paciente", "paciente_fk"),
            ("codigo_vacina", "vacina_fk"),
            ("codigo_cnes_estabelecimento", "estabelecimento_fk"),
            ("codigo_dose_vacina", "dose_fk"),
            ("codigo_local_aplicacao", "local_aplicacao_fk"),
            ("codigo_via_administracao", "via_administracao_fk"),
            ("codigo_estrategia_vacinacao", "estrategia_fk"),
            ("codigo_condicao_maternal", "condicao_maternal_fk"),
            ("codigo_origem_registro", "origem_registro_fk"),
            ("codigo_sistema_origem", "sistema_origem_fk"),
        ],
    )],
    primary_key: &["id"],
    foreign_keys: &[
        ForeignKey::new("paciente_fk", "Paciente"),
        ForeignKey::new("vacina_fk", "Vacina"),
        ForeignKey::new("estabelecimento_fk", "Estabelecimento"),
        ForeignKey::new("dose_fk", "DoseVacina"),
        ForeignKey::new("local_aplicacao_fk", "LocalAplicacao"),
        ForeignKey::new("via_administracao_fk", "ViaAdministracao"),
        ForeignKey::new("estrategia_fk", "EstrategiaVacinacao"),
        ForeignKey::new("condicao_maternal_fk", "CondicaoMaternal"),
        ForeignKey::new("origem_registro_fk", "OrigemRegistro"),
        ForeignKey::new("sistema_origem_fk", "SistemaOrigem"),
    ],
};

/// All destination tables, in load order.
pub static CATALOG: &[EntityDef] = &[
    RACA_COR,
    ETNIA_INDIGENA,
    FABRICANTE,
    DOSE_VACINA,
    GRUPO_ATENDIMENTO,
    CATEGORIA_ATENDIMENTO,
    TIPO_ESTABELECIMENTO,
    NATUREZA_ESTABELECIMENTO,
    LOCAL_APLICACAO,
    VIA_ADMINISTRACAO,
    ESTRATEGIA_VACINACAO,
    CONDICAO_MATERNAL,
    ORIGEM_REGISTRO,
    SISTEMA_ORIGEM,
    UF,
    MUNICIPIO,
    PACIENTE,
    ESTABELECIMENTO,
    VACINA,
    APLICACAO,
];
