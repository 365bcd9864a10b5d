//! Named analysis queries over the loaded database.

use crate::storage::{QueryResult, ReadStore, StorageError};

/// Errors from running a catalog query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown query '{0}'")]
    Unknown(String),

    #[error("Query '{key}' takes {expected} parameter(s) ({names}), got {given}")]
    Params {
        key: &'static str,
        expected: usize,
        names: String,
        given: usize,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A predefined query with positional `?` parameters.
#[derive(Debug, Clone, Copy)]
pub struct NamedQuery {
    pub key: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
    /// Parameter names, in placeholder order.
    pub params: &'static [&'static str],
}

impl NamedQuery {
    /// Run against `store`, checking the parameter count first.
    pub async fn run(&self, store: &ReadStore, params: &[String]) -> Result<QueryResult, QueryError> {
        if params.len() != self.params.len() {
            return Err(QueryError::Params {
                key: self.key,
                expected: self.params.len(),
                names: self.params.join(", "),
                given: params.len(),
            });
        }
        Ok(store.query(self.sql, params).await?)
    }
}

pub static CATALOG: &[NamedQuery] = &[
    NamedQuery {
        key: "idosos",
        title: "Pacientes com 60 anos ou mais",
        sql: "SELECT p.id, p.idade, p.sexo
              FROM Paciente AS p
              WHERE p.idade >= 60",
        params: &[],
    },
    NamedQuery {
        key: "aplicacoes-janeiro",
        title: "Aplicações entre 1 e 15 de janeiro",
        sql: "SELECT *
              FROM Aplicacao AS a
              WHERE a.data_aplicacao >= '2025-01-01' AND a.data_aplicacao <= '2025-01-15'",
        params: &[],
    },
    NamedQuery {
        key: "vacinas-fabricantes",
        title: "Vacinas e seus fabricantes",
        sql: "SELECT v.descricao AS vacina, f.descricao AS fabricante
              FROM Vacina AS v
              JOIN Fabricante AS f ON v.fabricante_fk = f.codigo
              ORDER BY f.descricao",
        params: &[],
    },
    NamedQuery {
        key: "vacinas-grupos",
        title: "Vacinas por grupo de atendimento",
        sql: "SELECT v.descricao AS vacina, ga.descricao AS grupo_atendimento
              FROM Vacina AS v
              JOIN GrupoAtendimento AS ga ON v.grupo_atendimento_fk = ga.codigo",
        params: &[],
    },
    NamedQuery {
        key: "estabelecimentos-tipos",
        title: "Estabelecimentos e seus tipos",
        sql: "SELECT e.nome_fantasia, te.descricao
              FROM Estabelecimento AS e
              JOIN TipoEstabelecimento AS te ON e.tipo_fk = te.codigo
              ORDER BY te.descricao",
        params: &[],
    },
    NamedQuery {
        key: "historico-paciente",
        title: "Histórico de um paciente",
        sql: "SELECT p.idade, p.sexo, rc.descricao AS raca_cor, e.nome_fantasia,
                     m.nome AS municipio, v.descricao AS vacina
              FROM Aplicacao AS a
              JOIN Paciente AS p ON a.paciente_fk = p.id
              JOIN RacaCor AS rc ON rc.codigo = p.raca_cor_fk
              JOIN Estabelecimento AS e ON e.id = a.estabelecimento_fk
              JOIN Municipio AS m ON m.codigo = e.municipio_fk
              JOIN Vacina AS v ON v.id = a.vacina_fk
              WHERE p.id = ?",
        params: &["paciente"],
    },
    NamedQuery {
        key: "idosos-covid-h1n1",
        title: "Pacientes 60+ com COVID/H1N1",
        sql: "SELECT p.id, p.idade, p.sexo
              FROM Paciente AS p
              JOIN Aplicacao AS a ON p.id = a.paciente_fk
              JOIN Vacina AS v ON a.vacina_fk = v.id
              WHERE v.id IN ('21', '31', '52') AND p.idade >= 60
              ORDER BY p.idade DESC",
        params: &[],
    },
    NamedQuery {
        key: "sistemas-origem",
        title: "Aplicações por sistema de origem",
        sql: "SELECT DISTINCT v.descricao AS vacina, so.descricao AS sistema_origem, a.data_aplicacao
              FROM Aplicacao AS a
              JOIN Vacina AS v ON a.vacina_fk = v.id
              JOIN SistemaOrigem AS so ON a.sistema_origem_fk = so.codigo",
        params: &[],
    },
    NamedQuery {
        key: "raca-cor",
        title: "Total de pacientes por raça/cor",
        sql: "SELECT rc.descricao, COUNT(p.id) AS total_pacientes
              FROM Paciente AS p
              JOIN RacaCor AS rc ON p.raca_cor_fk = rc.codigo
              GROUP BY rc.descricao
              ORDER BY total_pacientes DESC",
        params: &[],
    },
    NamedQuery {
        key: "fabricantes-bh",
        title: "Doses por fabricante em Belo Horizonte",
        sql: "SELECT f.descricao, COUNT(a.vacina_fk) AS total_doses_bh
              FROM Aplicacao AS a
              JOIN Vacina AS v ON a.vacina_fk = v.id
              JOIN Fabricante AS f ON v.fabricante_fk = f.codigo
              JOIN Estabelecimento AS e ON a.estabelecimento_fk = e.id
              JOIN Municipio AS m ON e.municipio_fk = m.codigo
              WHERE m.nome = 'BELO HORIZONTE'
              GROUP BY f.descricao
              ORDER BY total_doses_bh DESC",
        params: &[],
    },
];

/// Look up a query by key.
pub fn get(key: &str) -> Result<&'static NamedQuery, QueryError> {
    CATALOG
        .iter()
        .find(|q| q.key == key)
        .ok_or_else(|| QueryError::Unknown(key.to_string()))
}
